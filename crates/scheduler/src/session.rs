use std::path::Path;
use std::time::Instant;

use bakeconfig::BakeConfig;
use shadergraph::{ChannelSpec, Scene};
use tracing::debug;

use crate::engine::BakeEngine;
use crate::job::{BakeJob, JobSettings, JobStatus};
use crate::progress::{BakeReport, ProgressSnapshot};
use crate::SchedulerError;

/// Command surface around at most one bake job.
#[derive(Debug, Default)]
pub struct BakeSession {
    job: Option<BakeJob>,
}

/// Selected mesh objects; anything else in the selection is dropped.
pub fn mesh_selection(scene: &Scene) -> Vec<String> {
    scene
        .objects()
        .iter()
        .filter(|object| object.selected)
        .filter_map(|object| {
            if object.is_mesh() {
                Some(object.name.clone())
            } else {
                debug!(object = %object.name, kind = ?object.kind, "ignoring non-mesh selection");
                None
            }
        })
        .collect()
}

/// Resolves channel ids or keys against the registry, keeping the given order.
pub fn resolve_channels(names: &[String]) -> Result<Vec<&'static ChannelSpec>, SchedulerError> {
    let mut specs: Vec<&'static ChannelSpec> = Vec::with_capacity(names.len());
    for name in names {
        let spec = shadergraph::lookup(name)
            .ok_or_else(|| SchedulerError::UnknownChannel(name.clone()))?;
        if specs.iter().any(|seen| seen.id == spec.id) {
            debug!(channel = spec.id, "channel listed twice; baking it once");
            continue;
        }
        specs.push(spec);
    }
    Ok(specs)
}

impl BakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a job over the scene's selected meshes. A finished job is
    /// replaced; a running one is not.
    pub fn start(
        &mut self,
        scene: &Scene,
        config: &BakeConfig,
        working_dir: &Path,
        now: Instant,
    ) -> Result<&BakeJob, SchedulerError> {
        if self.status() == JobStatus::Running {
            return Err(SchedulerError::AlreadyRunning);
        }
        let channels = resolve_channels(&config.channels)?;
        let job = BakeJob::start(
            scene,
            mesh_selection(scene),
            channels,
            JobSettings::from_config(config, working_dir),
            now,
        )?;
        Ok(self.job.insert(job))
    }

    pub fn advance(
        &mut self,
        scene: &mut Scene,
        engine: &mut dyn BakeEngine,
        now: Instant,
    ) -> Result<JobStatus, SchedulerError> {
        match self.job.as_mut() {
            Some(job) => job.advance_step(scene, engine, now),
            None => Err(SchedulerError::NotRunning(JobStatus::Idle)),
        }
    }

    pub fn cancel(&mut self, scene: &mut Scene, now: Instant) -> Result<(), SchedulerError> {
        match self.job.as_mut() {
            Some(job) => job.cancel(scene, now),
            None => Err(SchedulerError::NotRunning(JobStatus::Idle)),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.job.as_ref().map_or(JobStatus::Idle, BakeJob::status)
    }

    pub fn job(&self) -> Option<&BakeJob> {
        self.job.as_ref()
    }

    pub fn progress(&self, now: Instant) -> Option<ProgressSnapshot> {
        self.job.as_ref().map(|job| job.progress(now))
    }

    pub fn report(&self) -> Option<BakeReport> {
        self.job.as_ref().and_then(BakeJob::report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::UvFillEngine;
    use imagetarget::{NamingConvention, UvRect};
    use shadergraph::{Material, ObjectKind, SceneObject, ShaderGraph};
    use tempfile::TempDir;

    fn scene() -> Scene {
        let mut scene = Scene::new();
        scene.add_material(Material::new("Plain", ShaderGraph::new()));
        scene.add_object(SceneObject::mesh("Crate").with_slot(Some("Plain"), UvRect::FULL));
        scene.add_object(SceneObject {
            name: "Sun".into(),
            kind: ObjectKind::Other("LIGHT".into()),
            selected: true,
            slots: Vec::new(),
        });
        let mut hidden = SceneObject::mesh("Hidden");
        hidden.selected = false;
        scene.add_object(hidden);
        scene
    }

    fn config(dir: &TempDir) -> BakeConfig {
        BakeConfig {
            channels: vec!["metallic".into()],
            width: 4,
            height: 4,
            naming: NamingConvention::MapOnly,
            output_dir: dir.path().display().to_string(),
            ..BakeConfig::default()
        }
    }

    #[test]
    fn selection_keeps_selected_meshes_only() {
        assert_eq!(mesh_selection(&scene()), ["Crate"]);
    }

    #[test]
    fn resolves_channels_in_order() {
        let names = ["normal".to_string(), "Base Color".into(), "NORMAL".into()];
        let specs = resolve_channels(&names).unwrap();
        let ids: Vec<_> = specs.iter().map(|spec| spec.id).collect();
        assert_eq!(ids, ["Normal", "Base Color"]);
        assert!(matches!(
            resolve_channels(&["Sheen".into()]),
            Err(SchedulerError::UnknownChannel(name)) if name == "Sheen"
        ));
    }

    #[test]
    fn one_job_at_a_time() {
        let temp = TempDir::new().unwrap();
        let mut scene = scene();
        let mut session = BakeSession::new();
        let now = Instant::now();
        assert_eq!(session.status(), JobStatus::Idle);
        assert!(matches!(
            session.cancel(&mut scene, now),
            Err(SchedulerError::NotRunning(JobStatus::Idle))
        ));

        let config = config(&temp);
        session.start(&scene, &config, temp.path(), now).unwrap();
        assert!(matches!(
            session.start(&scene, &config, temp.path(), now),
            Err(SchedulerError::AlreadyRunning)
        ));

        let mut engine = UvFillEngine::new();
        while session.advance(&mut scene, &mut engine, now).unwrap() == JobStatus::Running {}
        assert_eq!(session.status(), JobStatus::Done);
        assert!(temp.path().join("Metallic.png").exists());
        assert_eq!(session.progress(now).unwrap().fraction_complete, 1.0);

        session.start(&scene, &config, temp.path(), now).unwrap();
        assert_eq!(session.status(), JobStatus::Running);
        session.advance(&mut scene, &mut engine, now).unwrap();
        session.cancel(&mut scene, now).unwrap();
        assert!(session.report().unwrap().is_cancelled());
        assert!(!temp.path().join("Metallic.png").exists());
    }

    #[test]
    fn nothing_selected_is_an_empty_selection() {
        let temp = TempDir::new().unwrap();
        let mut scene = scene();
        scene.isolate("Sun").unwrap();
        let err = BakeSession::new()
            .start(&scene, &config(&temp), temp.path(), Instant::now())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::EmptySelection));
    }
}
