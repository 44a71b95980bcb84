//! Local file frame source using FFmpeg.
//!
//! Decodes the best video stream of a local file and follows a wall-clock
//! playback position: each `current_frame` call returns the frame due now,
//! skipping anything decoded behind the clock. A slow consumer therefore sees
//! fewer frames instead of an ever-growing backlog.

use std::collections::VecDeque;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::file::FileConfig;
use super::normalize::rgb_to_rgba;
use crate::frame::{Frame, FrameSize, FrameSource, MediaEvent};

const FALLBACK_FPS: f64 = 30.0;

pub(crate) struct FfmpegFileSource {
    config: FileConfig,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    size: FrameSize,
    frame_rate: f64,
    frame_count: u64,
    started_at: Option<Instant>,
    connected: bool,
    drained: bool,
    ended: bool,
    events: VecDeque<MediaEvent>,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: FileConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&config.path)
            .with_context(|| format!("failed to open '{}' with ffmpeg", config.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let rate = f64::from(input_stream.avg_frame_rate());
        let frame_rate = if rate.is_finite() && rate > 0.0 {
            rate
        } else {
            FALLBACK_FPS
        };
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        if decoder.width() == 0 || decoder.height() == 0 {
            return Err(anyhow!("video track reports no picture size"));
        }

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;
        let size = FrameSize::new(decoder.width(), decoder.height());

        Ok(Self {
            config,
            input,
            stream_index,
            decoder,
            scaler,
            size,
            frame_rate,
            frame_count: 0,
            started_at: None,
            connected: false,
            drained: false,
            ended: false,
            events: VecDeque::new(),
        })
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        for (stream, packet) in self.input.packets() {
            if stream.index() == self.stream_index {
                return Some(packet);
            }
        }
        None
    }

    fn decode_next(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb_frame = ffmpeg::frame::Video::empty();
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                let (pixels, size) = frame_to_pixels(&rgb_frame)?;
                let rgba = rgb_to_rgba(&pixels, size)?;
                let frame = Frame::from_rgba(size, rgba, self.frame_count)?;
                self.frame_count += 1;
                return Ok(Some(frame));
            }
            if self.drained {
                return Ok(None);
            }
            match self.next_packet() {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?,
                None => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.drained = true;
                }
            }
        }
    }
}

impl FrameSource for FfmpegFileSource {
    fn describe(&self) -> String {
        self.config.path.clone()
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        self.events.push_back(MediaEvent::DataLoaded(self.size));
        self.events.push_back(MediaEvent::Play);
        log::info!(
            "FileSource: connected to {} (ffmpeg, {}, {:.2} fps)",
            self.config.path,
            self.size,
            self.frame_rate
        );
        Ok(())
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.events.pop_front()
    }

    fn native_size(&self) -> Option<FrameSize> {
        self.connected.then_some(self.size)
    }

    fn current_frame(&mut self) -> Result<Option<Frame>> {
        if self.ended {
            return Ok(None);
        }
        let started = *self.started_at.get_or_insert_with(Instant::now);
        let due = (started.elapsed().as_secs_f64() * self.frame_rate).floor() as u64;

        let mut latest = None;
        while let Some(frame) = self.decode_next()? {
            let index = frame.index;
            latest = Some(frame);
            if index >= due {
                break;
            }
        }

        if latest.is_none() {
            self.ended = true;
            self.events.push_back(MediaEvent::Ended);
            log::info!(
                "FileSource: {} ended after {} frames",
                self.config.path,
                self.frame_count
            );
        }
        Ok(latest)
    }

    // Catching up after a slow tick can decode many frames.
    fn decode_is_blocking(&self) -> bool {
        true
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, FrameSize)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);
    let size = FrameSize::new(width, height);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), size));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, size))
}
