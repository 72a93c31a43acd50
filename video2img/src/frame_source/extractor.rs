use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::{FrameSource, Result, SourceMetadata};

use color_eyre::eyre::{self, Context};
use ffmpeg::codec::Context as CodecContext;
use ffmpeg::decoder::Video as DecoderVideo;
use ffmpeg::format::context::Input as FormatContext;
use ffmpeg::format::{input_with_dictionary, Pixel};
use ffmpeg::frame::Video as FrameVideo;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::context::Context as ScalingContext;
use ffmpeg::util::log as ffmpeglog;
use ffmpeg::{Dictionary, Packet as CodecPacket, Rational, Rescale};
use ffmpeg_next as ffmpeg;
use ffmpeg_sys_next::{AV_NOPTS_VALUE, AV_TIME_BASE_Q};
use image::RgbImage;

static FFMPEG_INITIALIZED: OnceLock<std::result::Result<(), ffmpeg::Error>> =
    OnceLock::new();

/// Decodes every frame of the best video stream of a file, in order, as upright RGB
/// images.
pub struct FrameExtractor {
    path: PathBuf,

    // ffmpeg contexts
    ictx: FormatContext,
    decoder: DecoderVideo,
    converter: ScalingContext,

    video_stream_index: usize,
    orientation: Orientation,
    metadata: SourceMetadata,
}

impl FrameExtractor {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Err(e) = FFMPEG_INITIALIZED.get_or_init(|| {
            ffmpeg::init()?;
            ffmpeglog::set_level(ffmpeglog::Level::Error);
            Ok(())
        }) {
            return Err(e).wrap_err("Failed to initialize ffmpeg");
        }

        let options = {
            let mut options = Dictionary::new();
            options.set("analyzeduration", "10M");
            options.set("probesize", "5M"); // this is the default
            options
        };
        let mut ictx =
            input_with_dictionary(&path, options).wrap_err("Failed to open the file")?;

        let video = ictx
            .streams()
            .best(Type::Video)
            .ok_or(eyre::eyre!("No video stream"))?;

        let video_stream_index = video.index();
        let fps = stream_fps(&video).ok_or(eyre::eyre!("No frame rate"))?;

        let orientation = match get_orientation(&video) {
            Some(x) => x,
            None => {
                log::warn!("Got a weird orientation angle in {path:?}, ignoring");
                Orientation::Normal
            }
        };

        let frame_count = match video.frames() {
            n if n > 0 => n as u64,
            _ => {
                let timebase = video.time_base();
                let duration = if video.duration() != AV_NOPTS_VALUE {
                    Some(video.duration())
                } else if ictx.duration() != AV_NOPTS_VALUE {
                    Some(ictx.duration().rescale(AV_TIME_BASE_Q, timebase))
                } else {
                    None
                };
                let seconds_per_ts = rational_to_f64(timebase).unwrap_or(0.0);
                let estimate = duration
                    .map(|ts| (seconds_per_ts * ts as f64 * fps).round())
                    .filter(|frames| frames.is_finite() && *frames >= 0.0)
                    .unwrap_or(0.0);
                log::debug!(
                    "{path:?} does not say how many frames it has, estimated {estimate}"
                );
                estimate as u64
            }
        };

        let decoder = CodecContext::from_parameters(video.parameters())
            .wrap_err("No codec found")?
            .decoder()
            .video()
            .wrap_err("No codec found, of type video (?)")?;

        let converter = Self::pixel_converter(&decoder)?;

        let (width, height) = match orientation {
            Orientation::Left | Orientation::Right => (decoder.height(), decoder.width()),
            Orientation::Normal | Orientation::Upside => (decoder.width(), decoder.height()),
        };

        ictx.streams_mut()
            .filter(|stream| stream.index() != video_stream_index)
            .for_each(|mut stream| stream_set_discard_all(&mut stream));

        Ok(Self {
            path: path.to_path_buf(),
            ictx,
            decoder,
            converter,
            video_stream_index,
            orientation,
            metadata: SourceMetadata {
                frame_count,
                width,
                height,
                fps,
            },
        })
    }

    fn pixel_converter(decoder: &DecoderVideo) -> Result<ScalingContext> {
        eyre::ensure!(decoder.format() != Pixel::None, "No pixel format");
        Ok(ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            // http://git.videolan.org/?p=ffmpeg.git;a=blob;f=libavutil/pixfmt.h;hb=HEAD
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::FAST_BILINEAR,
        )?)
    }

    pub fn next(&mut self) -> Result<Option<RgbImage>> {
        loop {
            let mut frame = FrameVideo::empty();
            // avcodec_receive_frame
            // https://ffmpeg.org/doxygen/trunk/group__lavc__decoding.html#ga11e6542c4e66d3028668788a1a74217c
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => {
                    let mut converted = FrameVideo::empty();
                    self.converter
                        .run(&frame, &mut converted)
                        .wrap_err("Failed to convert the decoded frame")?;
                    let img = create_rust_image(converted);
                    return Ok(Some(undo_rotation(img, self.orientation)));
                }
                Err(ffmpeg::Error::Other {
                    errno: libc::EAGAIN,
                }) => (),
                // End of stream situations.
                // https://ffmpeg.org/doxygen/trunk/avcodec_8h_source.html
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => {
                    return Err(e).wrap_err("Decoder error when receiving a frame from it");
                }
            }

            self.feed_decoder()?;
        }
    }

    /// Sends the next packet of the video stream to the decoder, or EOF if there are no
    /// more.
    fn feed_decoder(&mut self) -> Result<()> {
        loop {
            // http://ffmpeg.org/doxygen/trunk/group__lavf__decoding.html#ga4fdb3084415a82e3810de6ee60e46a61
            let mut packet = CodecPacket::empty();
            match packet.read(&mut self.ictx) {
                Ok(()) if packet.stream() == self.video_stream_index => {
                    match self.decoder.send_packet(&packet) {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            log::warn!("Failed to decode a packet of {:?}: {}", self.path, e);
                            continue;
                        }
                    }
                }
                Ok(()) => continue,
                Err(ffmpeg::Error::Eof) => {
                    self.decoder
                        .send_eof()
                        .wrap_err("Failed to send EOF to the decoder")?;
                    return Ok(());
                }
                Err(e) => {
                    eyre::bail!("Failed to read a packet from the stream: {e}");
                }
            }
        }
    }

    pub fn iter(&mut self) -> FrameExtractorIter<'_> {
        FrameExtractorIter { extractor: self }
    }
}

impl FrameSource for FrameExtractor {
    fn metadata(&self) -> SourceMetadata {
        self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        self.next()
    }
}

pub struct FrameExtractorIter<'a> {
    extractor: &'a mut FrameExtractor,
}

impl Iterator for FrameExtractorIter<'_> {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        self.extractor.next().transpose()
    }
}

fn rational_to_f64(r: Rational) -> Option<f64> {
    (r.denominator() != 0 && r.numerator() > 0)
        .then(|| f64::from(r.numerator()) / f64::from(r.denominator()))
}

/// The average frame rate, or the base rate if the container doesn't know the average.
fn stream_fps(video: &ffmpeg::Stream) -> Option<f64> {
    rational_to_f64(video.avg_frame_rate()).or_else(|| rational_to_f64(video.rate()))
}

#[derive(Clone, Copy, Debug)]
enum Orientation {
    Normal,
    Left,
    Right,
    Upside,
}

fn get_orientation(video: &ffmpeg::Stream) -> Option<Orientation> {
    for data in video.side_data() {
        if data.kind() != ffmpeg::packet::side_data::Type::DisplayMatrix {
            continue;
        }
        let rot = unsafe {
            ffmpeg_sys_next::av_display_rotation_get(data.data().as_ptr() as *const i32)
        };

        if rot.is_finite() {
            return match rot.round() as i32 {
                -90 => Some(Orientation::Right),
                90 => Some(Orientation::Left),
                0 => Some(Orientation::Normal),
                180 | -180 => Some(Orientation::Upside),
                _ => None,
            };
        }
    }

    Some(Orientation::Normal)
}

fn undo_rotation(img: RgbImage, ori: Orientation) -> RgbImage {
    match ori {
        Orientation::Normal => img,
        Orientation::Right => image::imageops::rotate90(&img),
        Orientation::Left => image::imageops::rotate270(&img),
        Orientation::Upside => image::imageops::rotate180(&img),
    }
}

fn create_rust_image(converted: FrameVideo) -> RgbImage {
    assert_eq!(Pixel::RGB24, converted.format());
    assert_eq!(1, converted.planes());

    let src_linesize = converted.stride(0);
    let width: usize = converted.width().try_into().expect("will always fit");
    let height: usize = converted.height().try_into().expect("will always fit");
    let data = converted.data(0);
    let trg_linesize = 3 * width;

    // NOTE: ffmpeg may pad every line
    let data = if src_linesize == trg_linesize {
        data[..trg_linesize * height].to_vec()
    } else {
        assert!(src_linesize >= trg_linesize);
        let mut nopadding = vec![0; trg_linesize * height];
        for i in 0..height {
            nopadding[(i * trg_linesize)..((i + 1) * trg_linesize)].copy_from_slice(
                &data[(i * src_linesize)..(i * src_linesize + trg_linesize)],
            );
        }
        nopadding
    };

    RgbImage::from_vec(
        width.try_into().expect("was an u32 before"),
        height.try_into().expect("was an u32 before"),
        data,
    )
    .expect("the buffer is big enough!")
}

fn stream_set_discard_all(stream: &mut ffmpeg::StreamMut<'_>) {
    unsafe {
        let ptr = stream.as_mut_ptr();
        if !ptr.is_null() {
            (*ptr).discard = ffmpeg_sys_next::AVDiscard::AVDISCARD_ALL;
        }
    }
}

impl fmt::Debug for FrameExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameExtractor")
            .field("path", &self.path)
            .field("stream", &self.video_stream_index)
            .field("orientation", &self.orientation)
            .field("metadata", &self.metadata)
            .finish()
    }
}
