//! The stepwise bake state machine.
//!
//! A [`BakeJob`] walks the (channel × object) matrix one object per
//! [`BakeJob::advance_step`] call. Each step isolates the object, patches its
//! node-based materials, invokes the bake primitive once and restores every
//! patched material before returning. When the last object of a channel is
//! done the channel's image is persisted and released.
//!
//! Time is passed in explicitly so drivers and tests control the clock.
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use bakeconfig::BakeConfig;
use imagetarget::{
    batch_label, compose_image_name, FileFormat, ImageTargetManager, NamingConvention,
    OutputDirResolver, TargetError,
};
use serde::Serialize;
use shadergraph::{
    patch, reinstate, restore, ChannelSpec, PatchError, PatchOutcome, PatchRecord, Scene,
    SelectionRecord,
};
use tracing::{debug, info, warn};

use crate::engine::{BakeEngine, BakeRequest};
use crate::progress::{BakeReport, ProgressSnapshot};
use crate::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Running,
    Cancelled,
    Done,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Idle => "idle",
            JobStatus::Running => "running",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Done => "done",
        };
        f.write_str(label)
    }
}

/// Run parameters captured once at start.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub width: u32,
    pub height: u32,
    pub naming: NamingConvention,
    pub output_dir: String,
    pub format: FileFormat,
    /// Base for relative output directories and unsaved projects.
    pub working_dir: PathBuf,
}

impl JobSettings {
    pub fn from_config(config: &BakeConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            width: config.width,
            height: config.height,
            naming: config.naming,
            output_dir: config.output_dir.clone(),
            format: config.format,
            working_dir: working_dir.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BakeFailure {
    pub object: String,
    pub channel: String,
    pub error: String,
}

#[derive(Debug)]
pub struct BakeJob {
    objects: Vec<String>,
    channels: Vec<&'static ChannelSpec>,
    settings: JobSettings,
    batch_label: String,
    channel_index: usize,
    object_index: usize,
    status: JobStatus,
    started_at: Instant,
    finished_at: Option<Instant>,
    images: ImageTargetManager,
    outstanding: Vec<PatchRecord>,
    /// Selections of skipped materials, cleared for the duration of a step.
    held_selections: Vec<SelectionRecord>,
    /// Set when a channel's last object is baked but its image is not saved yet.
    pending_persist: bool,
    completed_steps: usize,
    failures: Vec<BakeFailure>,
    written: Vec<PathBuf>,
}

impl BakeJob {
    pub fn start(
        scene: &Scene,
        objects: Vec<String>,
        channels: Vec<&'static ChannelSpec>,
        settings: JobSettings,
        now: Instant,
    ) -> Result<Self, SchedulerError> {
        if objects.is_empty() || channels.is_empty() {
            return Err(SchedulerError::EmptySelection);
        }
        if let Some(missing) = objects.iter().find(|name| scene.object(name).is_none()) {
            return Err(SchedulerError::UnknownObject(missing.clone()));
        }

        let resolver = OutputDirResolver::new(settings.working_dir.clone())
            .with_project_file(scene.project());
        let batch_label = batch_label(scene.project());
        info!(
            objects = objects.len(),
            channels = channels.len(),
            batch = %batch_label,
            width = settings.width,
            height = settings.height,
            "bake job started"
        );

        Ok(Self {
            objects,
            channels,
            settings,
            batch_label,
            channel_index: 0,
            object_index: 0,
            status: JobStatus::Running,
            started_at: now,
            finished_at: None,
            images: ImageTargetManager::new(resolver),
            outstanding: Vec::new(),
            held_selections: Vec::new(),
            pending_persist: false,
            completed_steps: 0,
            failures: Vec::new(),
            written: Vec::new(),
        })
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn objects(&self) -> &[String] {
        &self.objects
    }

    pub fn channels(&self) -> &[&'static ChannelSpec] {
        &self.channels
    }

    /// `(channel_index, object_index)`.
    pub fn cursor(&self) -> (usize, usize) {
        (self.channel_index, self.object_index)
    }

    pub fn total_steps(&self) -> usize {
        self.channels.len() * self.objects.len()
    }

    pub fn completed_steps(&self) -> usize {
        self.completed_steps
    }

    pub fn failures(&self) -> &[BakeFailure] {
        &self.failures
    }

    pub fn live_images(&self) -> usize {
        self.images.live_count()
    }

    pub fn outstanding_patches(&self) -> usize {
        self.outstanding.len()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.finished_at
            .unwrap_or(now)
            .saturating_duration_since(self.started_at)
    }

    /// Runs one unit of work and returns the status afterwards.
    ///
    /// Errors leave the job `Running` with the cursor where it was, so the
    /// caller can retry the step or cancel.
    pub fn advance_step(
        &mut self,
        scene: &mut Scene,
        engine: &mut dyn BakeEngine,
        now: Instant,
    ) -> Result<JobStatus, SchedulerError> {
        if self.status != JobStatus::Running {
            return Err(SchedulerError::NotRunning(self.status));
        }

        if self.pending_persist {
            self.finish_channel()?;
            return Ok(self.status);
        }

        let Some(channel) = self.channels.get(self.channel_index).copied() else {
            self.status = JobStatus::Done;
            self.finished_at = Some(now);
            info!(
                elapsed_secs = self.elapsed(now).as_secs_f64(),
                files = self.written.len(),
                failures = self.failures.len(),
                "bake job finished"
            );
            return Ok(self.status);
        };

        let image_name = self.image_name(channel);
        if self.object_index == 0 {
            self.images.create_target(
                &image_name,
                self.settings.width,
                self.settings.height,
                channel.color_space,
            )?;
        }

        let object = self.objects[self.object_index].clone();
        scene.isolate(&object)?;
        let materials = scene.node_materials_of(&object)?;

        if materials.is_empty() {
            info!(object = %object, channel = channel.id, "no node-based materials; skipping bake");
        } else {
            self.patch_materials(scene, &materials, channel, &image_name)?;
            if self.outstanding.is_empty() {
                debug!(object = %object, channel = channel.id, "nothing patched; skipping bake");
            } else {
                let request = BakeRequest {
                    object: &object,
                    mode: channel.bake_kind.into(),
                };
                let result = engine.bake(scene, &request, &mut self.images);
                if let Err(err) = result {
                    warn!(object = %object, channel = channel.id, error = %err, "bake failed");
                    self.failures.push(BakeFailure {
                        object: object.clone(),
                        channel: channel.id.to_string(),
                        error: err.to_string(),
                    });
                }
            }
            self.restore_outstanding(scene)?;
        }

        self.completed_steps += 1;
        debug!(
            object = %object,
            channel = channel.id,
            step = self.completed_steps,
            total = self.total_steps(),
            "step complete"
        );

        self.object_index += 1;
        if self.object_index == self.objects.len() {
            self.object_index = 0;
            self.pending_persist = true;
            self.finish_channel()?;
        }
        Ok(self.status)
    }

    /// Drops every image without saving, restores outstanding patches and
    /// removes files this job already wrote. Only valid while running.
    pub fn cancel(&mut self, scene: &mut Scene, now: Instant) -> Result<(), SchedulerError> {
        if self.status != JobStatus::Running {
            return Err(SchedulerError::NotRunning(self.status));
        }

        let restored = self.restore_outstanding(scene);
        let disposed = self.images.dispose_all();
        for path in self.written.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed image from cancelled job"),
                Err(err) => warn!(path = %path.display(), error = %err, "failed to remove image"),
            }
        }
        self.pending_persist = false;
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(now);
        info!(disposed, steps = self.completed_steps, "bake job cancelled");
        restored
    }

    pub fn progress(&self, now: Instant) -> ProgressSnapshot {
        let total = self.total_steps();
        let fraction_complete = match self.status {
            JobStatus::Done => 1.0,
            _ if total == 0 => 0.0,
            _ => self.completed_steps as f64 / total as f64,
        };
        let current_channel = match self.status {
            JobStatus::Running => self.channels.get(self.channel_index),
            _ => None,
        };
        let current_object = current_channel
            .filter(|_| !self.pending_persist)
            .and_then(|_| self.objects.get(self.object_index));
        // Without a current object, count the objects already finished in this channel.
        let object_ordinal = match current_object {
            Some(_) => self.object_index + 1,
            None if self.pending_persist || self.status == JobStatus::Done => self.objects.len(),
            None => self.object_index.min(self.objects.len()),
        };

        ProgressSnapshot {
            status: self.status,
            current_channel: current_channel.map(|spec| spec.id.to_string()),
            channel_ordinal: (self.channel_index + 1).min(self.channels.len()),
            channel_count: self.channels.len(),
            current_object: current_object.cloned(),
            object_ordinal,
            object_count: self.objects.len(),
            elapsed_seconds: self.elapsed(now).as_secs_f64(),
            fraction_complete,
        }
    }

    /// Final report, available once the job is done or cancelled.
    pub fn report(&self) -> Option<BakeReport> {
        let finished_at = self.finished_at?;
        Some(BakeReport {
            outcome: self.status,
            elapsed_seconds: self.elapsed(finished_at).as_secs_f64(),
            steps_completed: self.completed_steps,
            total_steps: self.total_steps(),
            files: self.written.clone(),
            failures: self.failures.clone(),
        })
    }

    fn image_name(&self, channel: &ChannelSpec) -> String {
        compose_image_name(channel.id, &self.batch_label, self.settings.naming)
    }

    fn patch_materials(
        &mut self,
        scene: &mut Scene,
        materials: &[String],
        channel: &ChannelSpec,
        image_name: &str,
    ) -> Result<(), SchedulerError> {
        let target = self
            .images
            .get(image_name)
            .ok_or_else(|| TargetError::UnknownTarget(image_name.to_string()))?;

        let mut failure: Option<PatchError> = None;
        for name in materials {
            let Some(material) = scene.material_mut(name) else {
                continue;
            };
            match patch(material, channel, target) {
                Ok(PatchOutcome::Patched(record)) => self.outstanding.push(record),
                Ok(PatchOutcome::Skipped(reason, held)) => {
                    warn!(material = %name, channel = channel.id, ?reason, "material skipped");
                    self.held_selections.extend(held);
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if let Some(err) = failure {
            if let Err(restore_err) = self.restore_outstanding(scene) {
                warn!(error = %restore_err, "restore after failed patch also failed");
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Restores and drops every outstanding record and gives skipped materials
    /// their selection back, returning the first error.
    fn restore_outstanding(&mut self, scene: &mut Scene) -> Result<(), SchedulerError> {
        let mut first_error: Option<SchedulerError> = None;
        for mut record in self.outstanding.drain(..) {
            let result = match scene.material_mut(record.material()) {
                Some(material) => restore(material, &mut record).map_err(SchedulerError::from),
                None => Err(SchedulerError::MissingMaterial(record.material().to_string())),
            };
            if let Err(err) = result {
                warn!(material = record.material(), error = %err, "restore failed");
                first_error.get_or_insert(err);
            }
        }
        for selection in self.held_selections.drain(..) {
            let result = match scene.material_mut(selection.material()) {
                Some(material) => reinstate(material, &selection).map_err(SchedulerError::from),
                None => Err(SchedulerError::MissingMaterial(selection.material().to_string())),
            };
            if let Err(err) = result {
                warn!(material = selection.material(), error = %err, "reinstate failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn finish_channel(&mut self) -> Result<(), SchedulerError> {
        let Some(channel) = self.channels.get(self.channel_index).copied() else {
            self.pending_persist = false;
            return Ok(());
        };
        let name = self.image_name(channel);
        let path = self
            .images
            .persist(&name, &self.settings.output_dir, self.settings.format)?;
        self.images.dispose(&name);
        self.written.push(path);
        self.pending_persist = false;
        self.channel_index += 1;
        info!(channel = channel.id, image = %name, "channel complete");
        Ok(())
    }
}
