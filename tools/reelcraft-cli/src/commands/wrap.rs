//! Preview caption wrapping and placement.

use reelcraft_assembly::subtitle::{
    resolve_position, wrap_text, FontMeasure, MonospaceMeasure, TextMeasure, WIDTH_BUDGET_RATIO,
};
use reelcraft_common::config::AppConfig;
use reelcraft_model::{CaptionPlacement, VideoAspect};

pub fn run(
    config: &AppConfig,
    text: String,
    aspect: Option<String>,
    placement: Option<String>,
    mono: bool,
) -> anyhow::Result<()> {
    let aspect = match aspect {
        Some(a) => a.parse::<VideoAspect>()?,
        None => config.assembly.aspect,
    };
    let placement = match placement {
        Some(p) => p.parse::<CaptionPlacement>()?,
        None => config.subtitle.placement,
    };

    let font = config.subtitle.font_spec();
    let measure: Box<dyn TextMeasure> = if mono {
        Box::new(MonospaceMeasure::for_size(font.size))
    } else {
        Box::new(FontMeasure::from_spec(&font).map_err(|e| {
            anyhow::anyhow!("{e} (pass --mono to preview without the font)")
        })?)
    };

    let (width, height) = aspect.resolution();
    let budget = width as f64 * WIDTH_BUDGET_RATIO;
    let wrapped = wrap_text(&text, budget, measure.as_ref());
    let (x, y) = resolve_position(placement, width as f64, height as f64, wrapped.width, wrapped.height);

    println!("Canvas: {width}x{height} ({aspect:?}), width budget {budget:.0}px");
    println!("Lines: {}", wrapped.lines);
    for line in wrapped.text.lines() {
        println!("  | {line}");
    }
    println!("Box: {:.0}x{:.0} at ({x:.0}, {y:.0})", wrapped.width, wrapped.height);
    Ok(())
}
