//! Scene manager: drives a frame source through one or more detectors and
//! assembles the resulting scene list.

use tracing::{debug, info, instrument, warn};

use crate::common::{Result, Scene, SceneDetectError};
use crate::frame_source::{Frame, FrameSource};
use crate::timecode::{FrameTimecode, FrameWindow};

/// A per-frame cut detector driven by [`SceneManager`]
///
/// Implementations see every frame of a window exactly once, in increasing
/// contiguous index order, and report at most one confirmed cut per frame.
pub trait SceneDetector {
    /// Score `frame` and return the first frame of a newly confirmed scene, if any
    fn process_frame(&mut self, frame: &Frame, frame_index: u32) -> Result<Option<u32>>;

    /// Forget all history before a new run
    fn reset(&mut self);

    /// Short name used in logs
    fn name(&self) -> &str {
        "detector"
    }
}

/// Releases the frame source however the run ends
struct ReleaseGuard<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
}

impl<S: FrameSource + ?Sized> Drop for ReleaseGuard<'_, S> {
    fn drop(&mut self) {
        self.source.release();
    }
}

/// Outcome of a run that processed its whole window
#[derive(Debug, Clone)]
struct CompletedRun {
    window: FrameWindow,
    frames_processed: u32,
    cuts: Vec<u32>,
}

/// Runs detectors over a frame source and builds the scene list
///
/// A cut reported by any detector starts a new scene.
#[derive(Default)]
pub struct SceneManager {
    detectors: Vec<Box<dyn SceneDetector>>,
    run: Option<CompletedRun>,
}

impl SceneManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detector for subsequent runs
    pub fn add_detector(&mut self, detector: impl SceneDetector + 'static) {
        debug!("Adding {} detector", detector.name());
        self.detectors.push(Box::new(detector));
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Process every frame in the source's window
    ///
    /// Detectors are reset first. The source is released when this returns,
    /// successfully or not. A failed run leaves no scene list behind.
    ///
    /// # Returns
    /// * `Result<u32>` - Number of frames processed, always the window length
    ///
    /// # Errors
    /// * `InvalidWindow` - If the source has no window
    /// * `FrameSource` - If the source fails to read or retrieve a frame
    /// * `FrameCountMismatch` - If the source ends early or yields extra frames
    /// * any detector error
    #[instrument(skip(self, source))]
    pub fn detect_scenes<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Result<u32> {
        self.run = None;
        let mut guard = ReleaseGuard { source };

        let window = guard.source.window().ok_or_else(|| SceneDetectError::InvalidWindow {
            message: "frame source has no window set".to_string(),
        })?;

        if self.detectors.is_empty() {
            warn!("No detectors registered; the whole window will be one scene");
        }
        for detector in self.detectors.iter_mut() {
            detector.reset();
        }

        let expected = window.len();
        let start = window.start().frame_number();
        info!(
            "Detecting scenes in frames {}-{} ({} frames, {} detectors)",
            start,
            window.end().frame_number(),
            expected,
            self.detectors.len()
        );

        let mut cuts = Vec::new();
        let mut processed: u32 = 0;

        loop {
            let frame_index = start.saturating_add(processed);
            let has_frame = guard.source.read().inspect_err(|e| {
                warn!("Frame source failed after {} of {} frames: {}", processed, expected, e);
            })?;
            if !has_frame {
                break;
            }

            processed += 1;
            if processed > expected {
                break;
            }

            let frame = guard.source.retrieve().ok_or_else(|| {
                SceneDetectError::source_error(frame_index, "read succeeded but no frame was retrieved")
            })?;

            for detector in self.detectors.iter_mut() {
                if let Some(cut) = detector.process_frame(frame, frame_index)? {
                    debug!("{} detector reported cut at frame {}", detector.name(), cut);
                    cuts.push(cut);
                }
            }

            if processed % 1000 == 0 {
                debug!("Processed {}/{} frames", processed, expected);
            }
        }

        if processed != expected {
            warn!("Frame source yielded {} frames, expected {}", processed, expected);
            return Err(SceneDetectError::FrameCountMismatch {
                expected,
                actual: processed,
            });
        }

        drop(guard);

        cuts.sort_unstable();
        cuts.dedup();

        info!("Scene detection completed. Found {} cuts in {} frames", cuts.len(), processed);

        self.run = Some(CompletedRun {
            window,
            frames_processed: processed,
            cuts,
        });

        Ok(processed)
    }

    /// Frames processed by the last completed run
    pub fn frames_processed(&self) -> Option<u32> {
        self.run.as_ref().map(|run| run.frames_processed)
    }

    /// Cut timecodes of the last completed run, relative to `base`
    pub fn cut_list(&self, base: &FrameTimecode) -> Result<Vec<FrameTimecode>> {
        let run = self.completed_run(base)?;
        Ok(scene_starts(run).skip(1).map(|frame| *base + frame).collect())
    }

    /// Scenes of the last completed run, relative to `base`
    ///
    /// Scenes are inclusive on both ends and partition the analyzed window:
    /// the first starts at the window start, the last ends at the window end,
    /// and each scene starts on the frame after the previous one ends.
    ///
    /// # Errors
    /// * `NoCompletedRun` - If no run has completed successfully
    /// * `FramerateMismatch` - If `base` uses a different framerate than the run
    pub fn scene_list(&self, base: &FrameTimecode) -> Result<Vec<Scene>> {
        let run = self.completed_run(base)?;
        let starts: Vec<u32> = scene_starts(run).collect();
        let end = run.window.end().frame_number();

        starts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let last = starts.get(i + 1).map_or(end, |next| next - 1);
                Scene::new(*base + start, *base + last)
            })
            .collect()
    }

    /// Forget the last run
    pub fn clear(&mut self) {
        self.run = None;
    }

    fn completed_run(&self, base: &FrameTimecode) -> Result<&CompletedRun> {
        let run = self.run.as_ref().ok_or(SceneDetectError::NoCompletedRun)?;
        base.ensure_same_rate(&run.window.start())?;
        Ok(run)
    }
}

/// Window start followed by every cut strictly inside the window
fn scene_starts(run: &CompletedRun) -> impl Iterator<Item = u32> + '_ {
    let window = run.window;
    let start = window.start().frame_number();
    std::iter::once(start).chain(
        run.cuts
            .iter()
            .copied()
            .filter(move |&cut| cut > start && window.contains(cut)),
    )
}

impl std::fmt::Debug for SceneManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.detectors.iter().map(|d| d.name()).collect();
        f.debug_struct("SceneManager")
            .field("detectors", &names)
            .field("run", &self.run)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_source::MemoryFrameSource;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Reports fixed cut indices when it sees them
    struct ScriptedDetector {
        cuts: Vec<u32>,
        resets: Rc<Cell<u32>>,
    }

    impl SceneDetector for ScriptedDetector {
        fn process_frame(&mut self, _frame: &Frame, frame_index: u32) -> Result<Option<u32>> {
            Ok(self.cuts.contains(&frame_index).then_some(frame_index))
        }

        fn reset(&mut self) {
            self.resets.set(self.resets.get() + 1);
        }
    }

    fn scripted(cuts: &[u32]) -> ScriptedDetector {
        ScriptedDetector {
            cuts: cuts.to_vec(),
            resets: Rc::new(Cell::new(0)),
        }
    }

    fn source(frames: usize) -> MemoryFrameSource {
        let frames = (0..frames).map(|_| Frame::solid(2, 2, [0, 0, 0]).unwrap()).collect();
        MemoryFrameSource::new(frames, 25.0).unwrap()
    }

    fn base() -> FrameTimecode {
        FrameTimecode::new(0, 25.0).unwrap()
    }

    fn bounds(scenes: &[Scene]) -> Vec<(u32, u32)> {
        scenes
            .iter()
            .map(|s| (s.start.frame_number(), s.end.frame_number()))
            .collect()
    }

    #[test]
    fn test_no_cuts_single_scene() {
        let mut manager = SceneManager::new();
        manager.add_detector(scripted(&[]));

        let mut source = source(50);
        assert_eq!(manager.detect_scenes(&mut source).unwrap(), 50);

        let scenes = manager.scene_list(&base()).unwrap();
        assert_eq!(bounds(&scenes), vec![(0, 49)]);
        assert!(manager.cut_list(&base()).unwrap().is_empty());
    }

    #[test]
    fn test_scene_list_partitions_window() {
        let mut manager = SceneManager::new();
        manager.add_detector(scripted(&[10, 25, 26]));

        let mut source = source(40);
        manager.detect_scenes(&mut source).unwrap();

        let scenes = manager.scene_list(&base()).unwrap();
        assert_eq!(bounds(&scenes), vec![(0, 9), (10, 24), (25, 25), (26, 39)]);
        assert_eq!(manager.frames_processed(), Some(40));
    }

    #[test]
    fn test_detectors_are_combined() {
        let mut manager = SceneManager::new();
        manager.add_detector(scripted(&[5, 20]));
        manager.add_detector(scripted(&[12, 20]));
        assert_eq!(manager.detector_count(), 2);

        let mut source = source(30);
        manager.detect_scenes(&mut source).unwrap();

        let cuts: Vec<u32> = manager
            .cut_list(&base())
            .unwrap()
            .iter()
            .map(|tc| tc.frame_number())
            .collect();
        assert_eq!(cuts, vec![5, 12, 20]);
        assert_eq!(manager.scene_list(&base()).unwrap().len(), 4);
    }

    #[test]
    fn test_window_offsets_frame_indices() {
        let mut manager = SceneManager::new();
        manager.add_detector(scripted(&[3, 12, 15]));

        let mut source = source(30);
        let window = FrameWindow::new(
            FrameTimecode::new(10, 25.0).unwrap(),
            FrameTimecode::new(19, 25.0).unwrap(),
        )
        .unwrap();
        source.set_window(window).unwrap();

        assert_eq!(manager.detect_scenes(&mut source).unwrap(), 10);
        let scenes = manager.scene_list(&base()).unwrap();
        assert_eq!(bounds(&scenes), vec![(10, 11), (12, 14), (15, 19)]);
    }

    #[test]
    fn test_detectors_reset_every_run() {
        let detector = scripted(&[2]);
        let resets = Rc::clone(&detector.resets);

        let mut manager = SceneManager::new();
        manager.add_detector(detector);

        manager.detect_scenes(&mut source(5)).unwrap();
        manager.detect_scenes(&mut source(5)).unwrap();
        assert_eq!(resets.get(), 2);
    }

    #[test]
    fn test_source_released_after_run() {
        let mut manager = SceneManager::new();
        manager.add_detector(scripted(&[]));

        let mut source = source(5);
        manager.detect_scenes(&mut source).unwrap();
        assert!(source.is_released());
    }

    #[test]
    fn test_scene_list_before_run() {
        let manager = SceneManager::new();
        assert!(matches!(manager.scene_list(&base()), Err(SceneDetectError::NoCompletedRun)));
    }

    #[test]
    fn test_scene_list_rejects_other_framerate() {
        let mut manager = SceneManager::new();
        let mut source = source(5);
        manager.detect_scenes(&mut source).unwrap();

        let other = FrameTimecode::new(0, 30.0).unwrap();
        assert!(matches!(
            manager.scene_list(&other),
            Err(SceneDetectError::FramerateMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_window_fails() {
        let mut manager = SceneManager::new();
        let mut empty = MemoryFrameSource::new(Vec::new(), 25.0).unwrap();
        assert!(matches!(
            manager.detect_scenes(&mut empty),
            Err(SceneDetectError::InvalidWindow { .. })
        ));
        assert!(empty.is_released());
    }

    #[test]
    fn test_clear_forgets_run() {
        let mut manager = SceneManager::new();
        let mut source = source(5);
        manager.detect_scenes(&mut source).unwrap();

        manager.clear();
        assert_eq!(manager.frames_processed(), None);
        assert!(manager.scene_list(&base()).is_err());
    }
}
