use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;

use crate::drivers::error::StreamError;
use crate::drivers::publish::{Published, NUM_DIVISIONS};

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
    /// At most this many channels are drawn, lowest index first.
    pub max_channels: usize,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            palette: vec![BLUE, RED, GREEN, CYAN, MAGENTA, YELLOW, WHITE],
            max_channels: 8,
        }
    }
}
/// Draws the latest published waveforms against the time base.
pub fn render_waveform_png(published: &Published, style: PlotStyle) -> Result<Vec<u8>, StreamError> {
    let traces: Vec<(usize, &[f64])> = published
        .waveforms
        .iter()
        .enumerate()
        .filter_map(|(ch, wf)| wf.as_ref().map(|wf| (ch, wf.samples.as_slice())))
        .take(style.max_channels)
        .collect();
    if traces.is_empty() {
        return Err(StreamError::Plot("no waveform has been published yet".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let (y_min, y_max) = traces
            .iter()
            .flat_map(|(_, s)| s.iter().copied())
            .fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let y_bounds = if (y_max - y_min).abs() < f64::EPSILON {
            (-1.0, 1.0)
        } else {
            (y_min, y_max)
        };
        let caption = match published.last_buffer_sample {
            Some(sample) => format!("Waveforms @ sample {sample}"),
            None => "Waveforms".to_string(),
        };
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(caption, ("sans-serif", 20).into_font().color(&WHITE))
            .set_label_area_size(LabelAreaPosition::Left, 45)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(0f64..NUM_DIVISIONS, y_bounds.0..y_bounds.1)?;
        chart
            .configure_mesh()
            .light_line_style(&WHITE.mix(0.1))
            .y_desc("V")
            .draw()?;
        for (idx, (channel, samples)) in traces.iter().enumerate() {
            let color = style.palette[idx % style.palette.len()];
            let series = published
                .time_base
                .iter()
                .copied()
                .zip(samples.iter().copied());
            chart
                .draw_series(LineSeries::new(series, &color))?
                .label(format!("Ch {channel}"))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        }
        chart
            .configure_series_labels()
            .border_style(&WHITE.mix(0.2))
            .background_style(&style.background)
            .draw()?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, StreamError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| StreamError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
