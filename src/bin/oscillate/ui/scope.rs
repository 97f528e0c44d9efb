//! Output oscilloscope

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    symbols,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame,
};

/// Clip level of a single oscillator. Patches that sum several sources
/// can exceed it; the chart clips them at the edge.
const Y_RANGE: f64 = 0.5;

pub fn render_scope(frame: &mut Frame, area: Rect, samples: &[f32]) {
    let len = samples.len().max(1) as f64;
    let points: Vec<(f64, f64)> = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| (i as f64 / len, f64::from(s)))
        .collect();

    let trace = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&points);

    let chart = Chart::new(vec![trace])
        .block(Block::default().title(" Output ").borders(Borders::ALL))
        .x_axis(Axis::default().bounds([0.0, 1.0]))
        .y_axis(
            Axis::default()
                .bounds([-Y_RANGE, Y_RANGE])
                .style(Style::default().fg(Color::DarkGray)),
        );

    frame.render_widget(chart, area);
}
