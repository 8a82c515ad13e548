use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::cache::fingerprint::{Fingerprint, job_fingerprint};
use crate::cache::store::{ArtifactCache, ArtifactSet, CacheEntry, FrameArtifacts};
use crate::config::PipelineConfig;
use crate::foundation::core::RasterFrame;
use crate::foundation::error::{GridmojiError, GridmojiResult};
use crate::media::decode::{DecodedMedia, decode};
use crate::media::sample::sample;
use crate::media::video::FrameSource;
use crate::pipeline::job::{JobOptions, JobRequest, JobStage, JobTracker};
use crate::transform::adapt::adapt;
use crate::transform::normalize::{EmojiArtifact, normalize};
use crate::transform::partition::{Tile, partition};

/// Result of a successful job.
#[derive(Clone, Debug)]
pub struct JobOutput {
    pub fingerprint: Fingerprint,
    pub entry: Arc<CacheEntry>,
    /// `true` when the artifacts came from the cache instead of this job's own computation.
    pub cache_hit: bool,
    /// Stages visited, in order.
    pub stages: Vec<JobStage>,
}

impl JobOutput {
    pub fn artifacts(&self) -> &ArtifactSet {
        &self.entry.artifacts
    }
}

/// The tiling service: bounded job admission, a dedicated normalization pool, and a shared cache.
pub struct Pipeline {
    config: PipelineConfig,
    cache: Arc<ArtifactCache>,
    pool: rayon::ThreadPool,
    slots: JobSlots,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Validate `config` and build a pipeline with its own cache.
    pub fn new(config: PipelineConfig) -> GridmojiResult<Self> {
        config.validate()?;
        let cache = Arc::new(ArtifactCache::new(&config.cache)?);
        Self::with_cache(config, cache)
    }

    /// Build a pipeline around an existing (possibly shared) cache.
    pub fn with_cache(config: PipelineConfig, cache: Arc<ArtifactCache>) -> GridmojiResult<Self> {
        config.validate()?;
        let pool = build_thread_pool(config.worker_threads)?;
        let slots = JobSlots::new(config.max_concurrent_jobs);
        Ok(Self {
            config,
            cache,
            pool,
            slots,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    /// Run one job to completion.
    ///
    /// The result is all-or-nothing: any failing tile fails the job and nothing partial is cached
    /// or returned.
    #[tracing::instrument(
        skip_all,
        fields(grid_x = req.grid_x, grid_y = req.grid_y, method = %req.method, quality = %req.quality)
    )]
    pub fn run(&self, req: &JobRequest) -> GridmojiResult<JobOutput> {
        let timeout = req.timeout.unwrap_or_else(|| self.config.timeout());
        let mut tracker = JobTracker::new(timeout);
        let started = Instant::now();

        match self.run_tracked(req, &mut tracker) {
            Ok((fingerprint, lookup_entry, computed)) => {
                tracker.enter(JobStage::Complete)?;
                tracing::info!(
                    fingerprint = %fingerprint,
                    cache_hit = !computed,
                    artifacts = lookup_entry.artifacts.artifact_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job complete"
                );
                Ok(JobOutput {
                    fingerprint,
                    entry: lookup_entry,
                    cache_hit: !computed,
                    stages: tracker.visited().to_vec(),
                })
            }
            Err(e) => {
                let stage = tracker.stage();
                tracker.fail();
                tracing::warn!(stage = %stage, kind = %e.kind(), error = %e, "job failed");
                Err(e)
            }
        }
    }

    fn run_tracked(
        &self,
        req: &JobRequest,
        tracker: &mut JobTracker,
    ) -> GridmojiResult<(Fingerprint, Arc<CacheEntry>, bool)> {
        let opts = req.options()?;
        if req.source.is_empty() {
            return Err(GridmojiError::processing("source buffer is empty"));
        }
        let _slot = self.slots.acquire(tracker.deadline())?;

        let fp = job_fingerprint(&req.source, &opts, &self.config);
        let deadline = tracker.deadline();
        let lookup = self.cache.get_or_compute(fp, Some(deadline), || {
            self.compute(&req.source, &opts, tracker)
        })?;
        Ok((fp, lookup.entry, lookup.computed))
    }

    fn compute(
        &self,
        source: &[u8],
        opts: &JobOptions,
        tracker: &mut JobTracker,
    ) -> GridmojiResult<ArtifactSet> {
        tracker.enter(JobStage::Decoding)?;
        let set = match decode(source)? {
            DecodedMedia::Image(frame) => self.compute_image(frame, opts, tracker)?,
            DecodedMedia::Video(video) => self.compute_video(video.as_ref(), opts, tracker)?,
        };
        tracker.enter(JobStage::CacheWriting)?;
        Ok(set)
    }

    fn compute_image(
        &self,
        frame: RasterFrame,
        opts: &JobOptions,
        tracker: &mut JobTracker,
    ) -> GridmojiResult<ArtifactSet> {
        tracker.enter(JobStage::Adapting)?;
        let adapted = adapt(&frame, opts.grid, opts.method, self.config.pad_color)?;
        drop(frame);

        tracker.enter(JobStage::Partitioning)?;
        let tiles = partition(&adapted, opts.grid)?;

        tracker.enter(JobStage::Normalizing)?;
        let mut per_frame = self.normalize_frames(&[tiles], opts, tracker)?;
        Ok(ArtifactSet::Image {
            tiles: per_frame.pop().unwrap_or_default(),
        })
    }

    fn compute_video(
        &self,
        video: &dyn FrameSource,
        opts: &JobOptions,
        tracker: &mut JobTracker,
    ) -> GridmojiResult<ArtifactSet> {
        tracker.enter(JobStage::Sampling)?;
        let samples = sample(video, &self.config.sampler)?;
        if samples.is_empty() {
            return Err(GridmojiError::processing("sampler produced no frames"));
        }
        let timestamps = samples.iter().map(|s| s.timestamp_sec).collect::<Vec<_>>();

        tracker.enter(JobStage::Adapting)?;
        let adapted = self.pool.install(|| {
            samples
                .par_iter()
                .map(|s| adapt(&s.frame, opts.grid, opts.method, self.config.pad_color))
                .collect::<GridmojiResult<Vec<RasterFrame>>>()
        })?;
        drop(samples);

        tracker.enter(JobStage::Partitioning)?;
        let tiles = self.pool.install(|| {
            adapted
                .par_iter()
                .map(|f| partition(f, opts.grid))
                .collect::<GridmojiResult<Vec<Vec<Tile>>>>()
        })?;
        drop(adapted);

        tracker.enter(JobStage::Normalizing)?;
        let per_frame = self.normalize_frames(&tiles, opts, tracker)?;
        Ok(ArtifactSet::Video {
            frames: timestamps
                .into_iter()
                .zip(per_frame)
                .map(|(timestamp_sec, tiles)| FrameArtifacts {
                    timestamp_sec,
                    tiles,
                })
                .collect(),
        })
    }

    /// Normalize every tile of every frame on the pool, keeping frame and row-major tile order.
    fn normalize_frames(
        &self,
        frames: &[Vec<Tile>],
        opts: &JobOptions,
        tracker: &JobTracker,
    ) -> GridmojiResult<Vec<Vec<EmojiArtifact>>> {
        let flat = frames.iter().flatten().collect::<Vec<&Tile>>();
        let cfg = &self.config.normalizer;
        let artifacts = self.pool.install(|| {
            flat.par_iter()
                .map(|tile| {
                    tracker.check()?;
                    normalize(&tile.frame, opts.quality, opts.remove_background, cfg)
                })
                .collect::<GridmojiResult<Vec<EmojiArtifact>>>()
        })?;

        let mut it = artifacts.into_iter();
        Ok(frames
            .iter()
            .map(|tiles| it.by_ref().take(tiles.len()).collect())
            .collect())
    }

    /// Stop admitting jobs, wait for running ones, then drain and stop the cache.
    pub fn shutdown(&self) {
        self.slots.close_and_drain();
        self.cache.shutdown();
    }
}

fn build_thread_pool(threads: Option<usize>) -> GridmojiResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(GridmojiError::configuration(
            "worker_threads must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("gridmoji-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| GridmojiError::processing(format!("failed to build rayon thread pool: {e}")))
}

/// Counting semaphore that gates job admission.
struct JobSlots {
    max: usize,
    state: Mutex<SlotState>,
    freed: Condvar,
}

#[derive(Default)]
struct SlotState {
    active: usize,
    closed: bool,
}

struct SlotGuard<'a> {
    slots: &'a JobSlots,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut st = self.slots.lock();
        st.active -= 1;
        drop(st);
        self.slots.freed.notify_all();
    }
}

impl JobSlots {
    fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            state: Mutex::new(SlotState::default()),
            freed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn acquire(&self, deadline: Instant) -> GridmojiResult<SlotGuard<'_>> {
        let started = Instant::now();
        let mut st = self.lock();
        loop {
            if st.closed {
                return Err(GridmojiError::processing("pipeline is shut down"));
            }
            if st.active < self.max {
                st.active += 1;
                return Ok(SlotGuard { slots: self });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(GridmojiError::timeout("waiting for a job slot", now - started));
            }
            tracing::debug!(active = st.active, "waiting for a job slot");
            st = self
                .freed
                .wait_timeout(st, (deadline - now).min(Duration::from_secs(1)))
                .unwrap_or_else(|p| p.into_inner())
                .0;
        }
    }

    fn close_and_drain(&self) {
        let mut st = self.lock();
        st.closed = true;
        while st.active > 0 {
            st = self.freed.wait(st).unwrap_or_else(|p| p.into_inner());
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/runner.rs"]
mod tests;
