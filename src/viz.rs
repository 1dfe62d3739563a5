//! Bar charts of tier distributions using Plotters

use plotters::prelude::*;
use tracing::info;

/// One colour per bar, cycled when there are more tiers
const TIER_COLORS: [RGBColor; 5] = [
    RGBColor(46, 134, 193),
    RGBColor(40, 180, 99),
    RGBColor(244, 208, 63),
    RGBColor(230, 126, 34),
    RGBColor(192, 57, 43),
];

/// Draw a PNG bar chart of label counts
///
/// # Arguments
/// * `title` - Chart caption
/// * `counts` - (label, customers) pairs, drawn left to right
/// * `output_path` - Where to save the PNG
pub fn create_distribution_chart(
    title: &str,
    counts: &[(String, usize)],
    output_path: &str,
) -> crate::Result<()> {
    if counts.is_empty() {
        anyhow::bail!("Nothing to plot for '{title}'");
    }
    let max_count = counts.iter().map(|(_, n)| *n).max().unwrap_or(1).max(1) as f64;
    let n_bars = counts.len() as f64;

    let root = BitMapBackend::new(output_path, (800, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..(n_bars - 0.5), 0f64..(max_count * 1.15))?;

    let label_at = |x: &f64| -> String {
        let rounded = x.round();
        if (x - rounded).abs() < 1e-6 && rounded >= 0.0 {
            counts
                .get(rounded as usize)
                .map(|(label, _)| label.clone())
                .unwrap_or_default()
        } else {
            String::new()
        }
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(counts.len())
        .x_label_formatter(&label_at)
        .y_desc("Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(i, (_, n))| {
        let x = i as f64;
        Rectangle::new(
            [(x - 0.35, 0.0), (x + 0.35, *n as f64)],
            TIER_COLORS[i % TIER_COLORS.len()].filled(),
        )
    }))?;

    chart.draw_series(counts.iter().enumerate().map(|(i, (_, n))| {
        Text::new(
            n.to_string(),
            (i as f64 - 0.1, *n as f64 + max_count * 0.03),
            ("sans-serif", 14),
        )
    }))?;

    root.present()?;
    info!(path = output_path, bars = counts.len(), "Chart saved");

    Ok(())
}
