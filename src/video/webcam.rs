//! V4L2 webcam access.
//!
//! Currently, only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are
//! supported. Frames are handed to the detector undecoded.

use std::{env, io, slice};

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat as V4lPixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::error::{Error, Result};
use crate::timer::Timer;

use super::{Frame, FrameStream, PixelFormat, Resolution, VideoSource};

/// Indicates whether to prefer a higher resolution or frame rate.
///
/// By default, [`ParamPreference::Resolution`] is used, selecting the maximum resolution at the
/// desired frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    #[default]
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    Framerate,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Format negotiation options.
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Sets the name of the webcam device to open.
    ///
    /// If no webcam with the given name can be found, opening the webcam will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver the desired resolution.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    ///
    /// A lower frame rate might be selected if the webcam cannot deliver the desired frame rate.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects whether to prefer a higher resolution or frame rate.
    #[inline]
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

impl FrameFormat {
    /// Frame rate in mHz.
    fn rate(&self) -> u32 {
        (1000.0 / self.frame_interval.as_f32()).round() as u32
    }
}

fn negotiate_format(device: &Device, mut prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == V4lPixelFormat::JPEG || format.pixel_format() == V4lPixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    loop {
        if let Some(fmt) = negotiate_format_step(&formats, prefs) {
            return Ok((
                PixFormat::new(
                    fmt.resolution.width(),
                    fmt.resolution.height(),
                    pixel_format,
                ),
                fmt.frame_interval,
            ));
        }

        log::debug!("failed to negotiate format with prefs {:?}", prefs);
        if !relax(&mut prefs) {
            break;
        }
        log::debug!("retrying with new prefs {:?}", prefs);
    }

    bail!("failed to negotiate a webcam format")
}

/// Drops the least important constraint from `prefs`.
///
/// Returns `false` if there was nothing left to drop.
fn relax(prefs: &mut FramePrefs) -> bool {
    match prefs.pref {
        ParamPreference::Resolution => {
            prefs.fps.take().is_some() || prefs.resolution.take().is_some()
        }
        ParamPreference::Framerate => {
            prefs.resolution.take().is_some() || prefs.fps.take().is_some()
        }
    }
}

fn negotiate_format_step(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
    let eligible = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| {
                fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
            }) && prefs.fps.map_or(true, |fps| fmt.rate() >= fps * 1000)
        })
        .copied();
    let mut formats = eligible.collect::<Vec<_>>();
    match prefs.pref {
        ParamPreference::Resolution => {
            formats.sort_by_key(|fmt| (fmt.resolution.num_pixels(), fmt.rate()))
        }
        ParamPreference::Framerate => {
            formats.sort_by_key(|fmt| (fmt.rate(), fmt.resolution.num_pixels()))
        }
    }
    formats.last().copied()
}

const ENV_VAR_WEBCAM_NAME: &str = "HANDSPIN_WEBCAM_NAME";

/// A V4L2 webcam [`VideoSource`].
///
/// The device is only opened when the detection loop acquires it.
#[derive(Debug, Default)]
pub struct Webcam {
    options: WebcamOptions,
}

impl Webcam {
    pub fn new(options: WebcamOptions) -> Self {
        Self { options }
    }

    /// Opens the first supported webcam found.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    fn open(&self) -> Result<WebcamStream> {
        if let Ok(name) = env::var(ENV_VAR_WEBCAM_NAME) {
            log::debug!(
                "webcam override: `{}` is set to '{}'",
                ENV_VAR_WEBCAM_NAME,
                name,
            );
        }

        let devices = linuxvideo::list().map_err(|e| device_error(&e.into()))?;
        let mut denied = None;
        for res in devices {
            match res {
                Ok(dev) => match open_device(dev, &self.options) {
                    Ok(Some(stream)) => return Ok(stream),
                    Ok(None) => {}
                    Err(e) => {
                        log::debug!("{:#}", e);
                        if let Error::PermissionDenied(msg) = device_error(&e) {
                            denied = Some(msg);
                        }
                    }
                },
                Err(e) => {
                    log::warn!("{}", e);
                    if e.kind() == io::ErrorKind::PermissionDenied {
                        denied = Some(e.to_string());
                    }
                }
            }
        }

        match denied {
            Some(msg) => Err(Error::PermissionDenied(msg)),
            None => Err(Error::DeviceUnavailable(
                "no supported webcam device found".into(),
            )),
        }
    }
}

impl VideoSource for Webcam {
    fn acquire(&mut self) -> Result<Box<dyn FrameStream>> {
        Ok(Box::new(self.open()?))
    }
}

/// Maps an error from device access to [`Error::PermissionDenied`] or
/// [`Error::DeviceUnavailable`].
fn device_error(e: &anyhow::Error) -> Error {
    let denied = e
        .chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|io| io.kind() == io::ErrorKind::PermissionDenied);
    if denied {
        Error::PermissionDenied(format!("{e:#}"))
    } else {
        Error::DeviceUnavailable(format!("{e:#}"))
    }
}

fn open_device(dev: Device, options: &WebcamOptions) -> anyhow::Result<Option<WebcamStream>> {
    let caps = dev.capabilities()?;
    let cam_name_from_env = env::var(ENV_VAR_WEBCAM_NAME).ok();
    if let Some(name) = &options.name.as_deref().or(cam_name_from_env.as_deref()) {
        if caps.card() != *name {
            return Ok(None);
        }
    }

    let cap_flags = caps.device_capabilities();
    let path = dev.path()?;
    log::debug!(
        "device {} ({}) capabilities: {:?}",
        caps.card(),
        path.display(),
        cap_flags,
    );

    if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
        return Ok(None);
    }

    let (pixfmt, fract) = negotiate_format(&dev, options.frame)?;

    let capture = dev.video_capture(pixfmt)?;

    let format = capture.format();
    let resolution = Resolution::new(format.width(), format.height());

    let actual = capture.set_frame_interval(fract)?;

    log::info!(
        "opened {} ({}), {} @ {:.1}Hz",
        caps.card(),
        path.display(),
        resolution,
        1.0 / actual.as_f32(),
    );

    let stream = capture.into_stream()?;

    Ok(Some(WebcamStream {
        stream,
        resolution,
        t_dequeue: Timer::new("dequeue"),
    }))
}

/// A streaming webcam yielding JPEG [`Frame`]s.
pub struct WebcamStream {
    stream: ReadStream,
    resolution: Resolution,
    t_dequeue: Timer,
}

impl FrameStream for WebcamStream {
    fn read(&mut self) -> Result<Frame> {
        let resolution = self.resolution;
        self.t_dequeue
            .time(|| {
                self.stream
                    .dequeue(|buf| Ok(Frame::new(buf.to_vec(), resolution, PixelFormat::Jpeg)))
            })
            .map_err(|e| Error::DeviceUnavailable(format!("webcam read failed: {e}")))
    }

    fn timers(&self) -> &[Timer] {
        slice::from_ref(&self.t_dequeue)
    }
}
