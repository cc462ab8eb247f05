//! Export dispatch.
//!
//! `save` renders every frame of a clip through a [`FrameSink`]; the
//! actual encoders are external, reached through a [`SinkFactory`].
//! Dispatch is by file extension. Because a full export would otherwise
//! flood the staging area with a whole video's worth of frames, the
//! render loop runs with staging locked.

use std::path::{Path, PathBuf};

use previz_core::{Frame, PrevizError, Result};
use previz_engine::cache;
use previz_engine::node::Clip;
use tracing::info;

/// What the extension dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    Video,
    Gif,
    ImageSequence,
}

impl SaveFormat {
    /// Dispatch on the path's extension.
    pub fn from_path(path: &Path) -> Result<SaveFormat> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "mp4" | "mov" | "avi" | "mkv" | "wmv" | "mpg" | "mpeg" => Ok(SaveFormat::Video),
            "gif" => Ok(SaveFormat::Gif),
            "png" | "jpg" | "jpeg" | "bmp" | "ppm" | "tiff" | "psd" => {
                Ok(SaveFormat::ImageSequence)
            }
            _ => Err(PrevizError::BadArgument(format!(
                "don't know how to write {path:?}; try an extension like .mp4, .gif or .png"
            ))),
        }
    }
}

/// Resolved video encoding options.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOptions {
    pub fps: f64,
    pub codec: String,
    pub pixel_format: String,
    /// Exactly one of quality, bitrate, or crf; crf 30 by default.
    pub quality: Option<u32>,
    pub bitrate: Option<u64>,
    pub crf: Option<u32>,
    pub ffmpeg_params: Vec<String>,
}

/// Resolved GIF encoding options.
#[derive(Debug, Clone, PartialEq)]
pub struct GifOptions {
    pub fps: f64,
    /// 0 loops forever.
    pub loops: u32,
    pub palette_size: u32,
    pub quantiser: String,
    pub optimise: bool,
}

/// Caller-facing knobs; unset fields take the engine defaults.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Frames per second; the clip's own rate when unset.
    pub fps: Option<f64>,
    /// Seconds per frame; alternative to `fps`.
    pub delay: Option<f64>,
    pub codec: Option<String>,
    pub pixel_format: Option<String>,
    pub quality: Option<u32>,
    pub bitrate: Option<u64>,
    pub crf: Option<u32>,
    pub ffmpeg_params: Vec<String>,
    /// Number of GIF loops; `None` loops forever.
    pub loops: Option<u32>,
    pub palette_size: Option<u32>,
    pub quantiser: Option<String>,
    pub optimise: Option<bool>,
}

impl SaveOptions {
    fn resolve_fps(&self, clip: &Clip) -> Result<f64> {
        match (self.fps, self.delay) {
            (Some(_), Some(_)) => Err(PrevizError::BadArgument(
                "expected at most one of fps and delay, but received both".into(),
            )),
            (Some(fps), None) => Ok(fps),
            (None, Some(delay)) => Ok(1.0 / delay),
            (None, None) => Ok(clip.fps()),
        }
    }

    fn resolve_video(&self, clip: &Clip) -> Result<VideoOptions> {
        let rate_knobs =
            self.quality.is_some() as u8 + self.bitrate.is_some() as u8 + self.crf.is_some() as u8;
        if rate_knobs > 1 {
            return Err(PrevizError::BadArgument(
                "expected at most one of quality, bitrate and crf".into(),
            ));
        }
        let (quality, bitrate, mut crf) = (self.quality, self.bitrate, self.crf);
        if rate_knobs == 0 {
            crf = Some(30);
        }
        Ok(VideoOptions {
            fps: self.resolve_fps(clip)?,
            codec: self.codec.clone().unwrap_or_else(|| "libx264".into()),
            pixel_format: self.pixel_format.clone().unwrap_or_else(|| "yuv420p".into()),
            quality,
            bitrate,
            crf,
            ffmpeg_params: self.ffmpeg_params.clone(),
        })
    }

    fn resolve_gif(&self, clip: &Clip) -> Result<GifOptions> {
        Ok(GifOptions {
            fps: self.resolve_fps(clip)?,
            loops: self.loops.unwrap_or(0),
            palette_size: self.palette_size.unwrap_or(256),
            quantiser: self.quantiser.clone().unwrap_or_else(|| "wu".into()),
            optimise: self.optimise.unwrap_or(false),
        })
    }
}

/// Receives rendered frames during an export.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Opens sinks for the three formats. The harness installs encoders;
/// tests use [`CollectingSink`].
pub trait SinkFactory {
    fn video(&mut self, path: &Path, options: &VideoOptions) -> Result<Box<dyn FrameSink>>;
    fn gif(&mut self, path: &Path, options: &GifOptions) -> Result<Box<dyn FrameSink>>;
    /// One sink per image; `index_width` digits of zero padding.
    fn image(&mut self, path: &Path, index_width: usize) -> Result<Box<dyn FrameSink>>;
}

/// Render every frame of `clip` into the sink `factory` provides for
/// the path's format. Staging stays locked for the duration.
pub fn save(
    clip: &Clip,
    path: impl AsRef<Path>,
    options: &SaveOptions,
    factory: &mut dyn SinkFactory,
) -> Result<()> {
    let path = path.as_ref();
    let format = SaveFormat::from_path(path)?;

    cache::with_current(|c| c.lock_staging())?;
    let outcome = write_frames(clip, path, format, options, factory);
    cache::with_current(|c| c.unlock_staging())?;
    outcome
}

fn write_frames(
    clip: &Clip,
    path: &Path,
    format: SaveFormat,
    options: &SaveOptions,
    factory: &mut dyn SinkFactory,
) -> Result<()> {
    let frame_count = clip.frame_count();
    info!(?path, ?format, frames = frame_count, "exporting clip");
    match format {
        SaveFormat::Video => {
            let resolved = options.resolve_video(clip)?;
            let mut sink = factory.video(path, &resolved)?;
            for n in 0..frame_count {
                sink.write_frame(&*clip.frame(n)?)?;
            }
            sink.finish()
        }
        SaveFormat::Gif => {
            let resolved = options.resolve_gif(clip)?;
            let mut sink = factory.gif(path, &resolved)?;
            for n in 0..frame_count {
                sink.write_frame(&*clip.frame(n)?)?;
            }
            sink.finish()
        }
        SaveFormat::ImageSequence => {
            let index_width = (frame_count as f64).log10().floor() as usize + 1;
            let stem = path.with_extension("");
            for n in 0..frame_count {
                let image_path = PathBuf::from(format!(
                    "{}_{n:0index_width$}.png",
                    stem.display()
                ));
                let mut sink = factory.image(&image_path, index_width)?;
                sink.write_frame(&*clip.frame(n)?)?;
                sink.finish()?;
            }
            Ok(())
        }
    }
}

/// A sink that keeps the frames in memory; test and tooling support.
#[derive(Default)]
pub struct CollectingSink {
    pub frames: Vec<Frame>,
    pub finished: bool,
}

impl FrameSink for CollectingSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use previz_engine::testing;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records resolved options and counts frames per opened sink.
    struct RecordingFactory {
        video_options: Option<VideoOptions>,
        gif_options: Option<GifOptions>,
        image_paths: Vec<PathBuf>,
        frames_written: Rc<RefCell<usize>>,
    }

    impl RecordingFactory {
        fn new() -> Self {
            Self {
                video_options: None,
                gif_options: None,
                image_paths: Vec::new(),
                frames_written: Rc::new(RefCell::new(0)),
            }
        }

        fn counting_sink(&self) -> Box<dyn FrameSink> {
            struct CountingSink(Rc<RefCell<usize>>);
            impl FrameSink for CountingSink {
                fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
                    *self.0.borrow_mut() += 1;
                    Ok(())
                }
                fn finish(&mut self) -> Result<()> {
                    Ok(())
                }
            }
            Box::new(CountingSink(self.frames_written.clone()))
        }
    }

    impl SinkFactory for RecordingFactory {
        fn video(&mut self, _path: &Path, options: &VideoOptions) -> Result<Box<dyn FrameSink>> {
            self.video_options = Some(options.clone());
            Ok(self.counting_sink())
        }

        fn gif(&mut self, _path: &Path, options: &GifOptions) -> Result<Box<dyn FrameSink>> {
            self.gif_options = Some(options.clone());
            Ok(self.counting_sink())
        }

        fn image(&mut self, path: &Path, _index_width: usize) -> Result<Box<dyn FrameSink>> {
            self.image_paths.push(path.to_path_buf());
            Ok(self.counting_sink())
        }
    }

    #[test]
    fn test_extension_dispatch() {
        assert_eq!(
            SaveFormat::from_path(Path::new("out.MP4")).unwrap(),
            SaveFormat::Video
        );
        assert_eq!(
            SaveFormat::from_path(Path::new("out.gif")).unwrap(),
            SaveFormat::Gif
        );
        assert_eq!(
            SaveFormat::from_path(Path::new("out.png")).unwrap(),
            SaveFormat::ImageSequence
        );
        assert!(SaveFormat::from_path(Path::new("out.xyz")).is_err());
    }

    #[test]
    fn test_video_defaults() {
        let _guard = testing::isolated_session(64);
        let clip = testing::gradient_clip(8, 8, 5);
        let mut factory = RecordingFactory::new();
        save(&clip, "out.mp4", &SaveOptions::default(), &mut factory).unwrap();

        let options = factory.video_options.unwrap();
        assert_eq!(options.codec, "libx264");
        assert_eq!(options.pixel_format, "yuv420p");
        assert_eq!(options.crf, Some(30));
        assert_eq!(options.fps, clip.fps());
        assert_eq!(*factory.frames_written.borrow(), 5);
    }

    #[test]
    fn test_conflicting_rate_knobs_rejected() {
        let _guard = testing::isolated_session(64);
        let clip = testing::gradient_clip(8, 8, 5);
        let mut factory = RecordingFactory::new();
        let options = SaveOptions {
            quality: Some(5),
            crf: Some(20),
            ..Default::default()
        };
        assert!(save(&clip, "out.mp4", &options, &mut factory).is_err());
    }

    #[test]
    fn test_gif_defaults() {
        let _guard = testing::isolated_session(64);
        let clip = testing::gradient_clip(8, 8, 3);
        let mut factory = RecordingFactory::new();
        save(&clip, "out.gif", &SaveOptions::default(), &mut factory).unwrap();

        let options = factory.gif_options.unwrap();
        assert_eq!(options.loops, 0);
        assert_eq!(options.palette_size, 256);
        assert_eq!(options.quantiser, "wu");
        assert!(!options.optimise);
    }

    #[test]
    fn test_image_sequence_numbering() {
        let _guard = testing::isolated_session(64);
        let clip = testing::gradient_clip(8, 8, 12);
        let mut factory = RecordingFactory::new();
        save(&clip, "frames.png", &SaveOptions::default(), &mut factory).unwrap();

        assert_eq!(factory.image_paths.len(), 12);
        assert!(factory.image_paths[0].to_string_lossy().ends_with("frames_00.png"));
        assert!(factory.image_paths[11].to_string_lossy().ends_with("frames_11.png"));
    }

    #[test]
    fn test_export_does_not_stage() {
        let _guard = testing::isolated_session(64);
        // Simulate exporting from inside a running script.
        cache::with_current(|c| c.set_script_running(true));
        let clip = testing::gradient_clip(8, 8, 4);
        let mut factory = RecordingFactory::new();
        save(&clip, "out.mp4", &SaveOptions::default(), &mut factory).unwrap();
        assert_eq!(cache::with_current(|c| c.staged_frame_count()), 0);
        cache::with_current(|c| c.set_script_running(false));
    }

    #[test]
    fn test_staging_unlocked_after_sink_error() {
        let _guard = testing::isolated_session(64);
        let clip = testing::gradient_clip(8, 8, 4);

        struct FailingFactory;
        impl SinkFactory for FailingFactory {
            fn video(&mut self, _: &Path, _: &VideoOptions) -> Result<Box<dyn FrameSink>> {
                Err(PrevizError::BadArgument("no encoder".into()))
            }
            fn gif(&mut self, _: &Path, _: &GifOptions) -> Result<Box<dyn FrameSink>> {
                unreachable!()
            }
            fn image(&mut self, _: &Path, _: usize) -> Result<Box<dyn FrameSink>> {
                unreachable!()
            }
        }
        assert!(save(&clip, "out.mp4", &SaveOptions::default(), &mut FailingFactory).is_err());
        // The lock was released despite the failure.
        assert!(cache::with_current(|c| c.lock_staging()).is_ok());
        cache::with_current(|c| c.unlock_staging()).unwrap();
    }
}
