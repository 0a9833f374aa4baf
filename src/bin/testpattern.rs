//! Draw a scrolling colour-bar pattern and present it.
//!
//! Runs against the real devices (paths from `GOU_*` variables) or, with
//! `--simulate` in a build with the `sim` feature, against in-process
//! stand-ins.

use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use log::LevelFilter;

use gou::{Display, DisplayConfig, Mirror, PixelFormat, Rect, Surface};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Rgb565,
    Xrgb8888,
}

impl From<Format> for PixelFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Rgb565 => PixelFormat::Rgb565,
            Format::Xrgb8888 => PixelFormat::Xrgb8888,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "gou-testpattern", about = "Present a test pattern on the display")]
struct Args {
    /// Number of frames to present.
    #[arg(long, default_value_t = 300)]
    frames: u32,

    /// Source surface width.
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Source surface height.
    #[arg(long, default_value_t = 240)]
    height: u32,

    #[arg(long, value_enum, default_value_t = Format::Rgb565)]
    format: Format,

    /// Keep the source aspect ratio and letterbox the rest.
    #[arg(long)]
    letterbox: bool,

    #[arg(long)]
    mirror_x: bool,

    #[arg(long)]
    mirror_y: bool,

    /// Use simulated devices instead of /dev nodes.
    #[arg(long)]
    simulate: bool,

    /// Log level.
    #[arg(long, default_value_t = LevelFilter::Info)]
    log: LevelFilter,
}

const BARS: [(u8, u8, u8); 8] = [
    (255, 255, 255),
    (255, 255, 0),
    (0, 255, 255),
    (0, 255, 0),
    (255, 0, 255),
    (255, 0, 0),
    (0, 0, 255),
    (0, 0, 0),
];

fn draw(surface: &mut Surface, frame: u32) {
    let width = surface.width() as usize;
    let height = surface.height() as usize;
    let stride = surface.stride();
    let format = surface.format();
    let pixels = surface.map();

    for y in 0..height {
        let row = &mut pixels[y * stride..];
        for x in 0..width {
            let bar = ((x + frame as usize) * BARS.len() / width) % BARS.len();
            let (r, g, b) = BARS[bar];
            match format {
                PixelFormat::Rgb565 => {
                    let v = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                    row[x * 2..x * 2 + 2].copy_from_slice(&v.to_le_bytes());
                }
                _ => {
                    let v = u32::from_be_bytes([0xff, r, g, b]);
                    row[x * 4..x * 4 + 4].copy_from_slice(&v.to_le_bytes());
                }
            }
        }
    }
}

/// Largest rectangle of the source's aspect ratio centred on the screen.
fn fit(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Rect {
    let (w, h) = if src_w as u64 * dst_h as u64 > dst_w as u64 * src_h as u64 {
        (dst_w, (dst_w as u64 * src_h as u64 / src_w as u64) as u32)
    } else {
        ((dst_h as u64 * src_w as u64 / src_h as u64) as u32, dst_h)
    };
    Rect::new(((dst_w - w) / 2) as i32, ((dst_h - h) / 2) as i32, w, h)
}

#[cfg(feature = "sim")]
fn simulated_display(config: &DisplayConfig) -> Result<Display> {
    use std::sync::Arc;

    use gou::sim::{SimAccelerator, SimHeap, SimScanout};
    use gou::Devices;

    let devices = Devices::simulated(
        Arc::new(SimScanout::new(480, 854, 3)),
        Arc::new(SimAccelerator::new()),
        Arc::new(SimHeap::new()),
    );
    Ok(Display::with_devices(devices, config.background_color))
}

#[cfg(not(feature = "sim"))]
fn simulated_display(_config: &DisplayConfig) -> Result<Display> {
    bail!("--simulate needs a build with the `sim` feature")
}

fn main() -> Result<()> {
    let args = Args::parse();
    gou::logger::init(args.log)?;

    if args.width == 0 || args.height == 0 {
        bail!("surface size must be non-zero");
    }

    let config = DisplayConfig::from_env()?;
    let display = if args.simulate {
        simulated_display(&config)?
    } else {
        Display::with_config(&config)
    };
    log::info!("{:?}", display);

    let mut surface = Surface::new(&display, args.width, args.height, args.format.into());
    let src = Rect::new(0, 0, args.width, args.height);
    let dst = if args.letterbox {
        fit(args.width, args.height, display.width(), display.height())
    } else {
        Rect::from_size(display.size())
    };
    let mirror = Mirror::new(args.mirror_x, args.mirror_y);

    let start = Instant::now();
    for frame in 0..args.frames {
        draw(&mut surface, frame);
        display.present(&surface, src, mirror, dst);
    }
    let elapsed = start.elapsed();

    log::info!(
        "{} frames in {:.2?} ({:.1} fps)",
        args.frames,
        elapsed,
        args.frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    display.destroy();
    surface.destroy();
    Ok(())
}
