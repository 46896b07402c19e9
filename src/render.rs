use std::io::Cursor;
use std::panic;
use std::ops::Range;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbImage};
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::statistics::RenderSeries;

/// matplotlib's `tab20`.
const TAB20: [RGBColor; 20] = [
    RGBColor(31, 119, 180),
    RGBColor(174, 199, 232),
    RGBColor(255, 127, 14),
    RGBColor(255, 187, 120),
    RGBColor(44, 160, 44),
    RGBColor(152, 223, 138),
    RGBColor(214, 39, 40),
    RGBColor(255, 152, 150),
    RGBColor(148, 103, 189),
    RGBColor(197, 176, 213),
    RGBColor(140, 86, 75),
    RGBColor(196, 156, 148),
    RGBColor(227, 119, 194),
    RGBColor(247, 182, 210),
    RGBColor(127, 127, 127),
    RGBColor(199, 199, 199),
    RGBColor(188, 189, 34),
    RGBColor(219, 219, 141),
    RGBColor(23, 190, 207),
    RGBColor(158, 218, 229),
];

pub fn series_color(index: usize) -> RGBColor {
    TAB20[index % TAB20.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegendPlacement {
    /// In a strip to the right of the plot area.
    OutsideRight,
    /// Inside the plot area, lower-right corner, no frame.
    InsideLowerRight,
}

#[derive(Debug, Clone)]
pub struct LabeledSeries {
    pub label: String,
    pub series: RenderSeries,
}

/// One chart in the page grid.
#[derive(Debug, Clone)]
pub struct ChartCell {
    pub title: String,
    pub x_desc: &'static str,
    pub y_desc: &'static str,
    pub x_range: Range<f64>,
    pub y_range: Range<f64>,
    pub series: Vec<LabeledSeries>,
}

/// A full page: optional heading plus a grid of charts.
#[derive(Debug, Clone)]
pub struct PageFigure {
    pub heading: Option<String>,
    pub grid: (usize, usize),
    pub cells: Vec<ChartCell>,
    pub legend: LegendPlacement,
    pub size: (u32, u32),
    /// Font multiplier; 1.0 at 100 DPI.
    pub text_scale: f64,
}

impl PageFigure {
    fn font_size(&self, points: f64) -> f64 {
        (points * self.text_scale).max(6.0)
    }

    fn font(&self, points: f64) -> FontDesc<'static> {
        FontDesc::new(FontFamily::SansSerif, self.font_size(points), FontStyle::Normal)
    }
}

/// Draws `figure` into an RGB image. Font backends can panic on hosts without
/// usable fonts, so panics are turned into errors.
pub fn render_page(figure: &PageFigure) -> Result<RgbImage> {
    panic::catch_unwind(panic::AssertUnwindSafe(|| draw_to_image(figure)))
        .map_err(|_| anyhow!("plotting backend panicked"))?
}

fn draw_to_image(figure: &PageFigure) -> Result<RgbImage> {
    let (width, height) = figure.size;
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        draw_page(&root, figure)?;
        root.present()?;
    }
    RgbImage::from_raw(width, height, buffer).context("render buffer does not match figure size")
}

fn draw_page<DB>(root: &DrawingArea<DB, Shift>, figure: &PageFigure) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    match &figure.heading {
        Some(heading) => draw_grid(&root.titled(heading, figure.font(14.0))?, figure),
        None => draw_grid(root, figure),
    }
}

fn draw_grid<DB>(body: &DrawingArea<DB, Shift>, figure: &PageFigure) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (rows, cols) = figure.grid;
    let areas = body.split_evenly((rows.max(1), cols.max(1)));
    if figure.cells.len() > areas.len() {
        log::warn!(
            "{} charts for a {}x{} grid, extra charts dropped",
            figure.cells.len(),
            rows,
            cols
        );
    }
    for (area, cell) in areas.iter().zip(&figure.cells) {
        draw_cell(area, cell, figure)?;
    }
    Ok(())
}

fn draw_cell<DB>(area: &DrawingArea<DB, Shift>, cell: &ChartCell, figure: &PageFigure) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (width, _) = area.dim_in_pixel();
    let legend_width = match figure.legend {
        LegendPlacement::OutsideRight => width * 30 / 100,
        LegendPlacement::InsideLowerRight => 0,
    };
    let (plot_area, legend_area) = area.split_horizontally(width - legend_width);

    let title_size = figure.font_size(10.0);
    let label_size = figure.font_size(8.0);

    let mut chart = ChartBuilder::on(&plot_area)
        .caption(&cell.title, figure.font(10.0))
        .margin(6)
        .x_label_area_size((label_size * 3.5) as u32)
        .y_label_area_size((label_size * 4.5) as u32)
        .build_cartesian_2d(cell.x_range.clone(), cell.y_range.clone())?;

    chart
        .configure_mesh()
        .x_desc(cell.x_desc)
        .y_desc(cell.y_desc)
        .light_line_style(TRANSPARENT)
        .bold_line_style(BLACK.mix(0.1))
        .label_style(figure.font(8.0))
        .axis_desc_style(figure.font(8.0))
        .x_label_formatter(&|v| trim_number(*v))
        .y_label_formatter(&|v| trim_number(*v))
        .draw()?;

    for (idx, labeled) in cell.series.iter().enumerate() {
        let color = series_color(idx);
        let points = labeled.series.points().to_vec();
        if let RenderSeries::Density { .. } = labeled.series {
            chart.draw_series(AreaSeries::new(points.iter().copied(), 0.0, color.mix(0.15)))?;
        }
        let drawn = chart.draw_series(LineSeries::new(points, color.stroke_width(2)))?;
        if figure.legend == LegendPlacement::InsideLowerRight {
            drawn
                .label(labeled.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2)));
        }
    }

    match figure.legend {
        LegendPlacement::InsideLowerRight => {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::LowerRight)
                .background_style(WHITE.mix(0.6))
                .border_style(TRANSPARENT)
                .label_font(figure.font(7.0))
                .draw()?;
        }
        LegendPlacement::OutsideRight => {
            // line up with the top of the plot, below the caption
            let top = (title_size * 1.5) as i32 + 6;
            draw_side_legend(&legend_area, &cell.series, top, figure.font(7.0))?;
        }
    }
    Ok(())
}

fn draw_side_legend<DB>(
    area: &DrawingArea<DB, Shift>,
    series: &[LabeledSeries],
    top: i32,
    font: FontDesc<'static>,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let font_size = font.get_size();
    let line_height = (font_size * 1.6) as i32;
    for (idx, labeled) in series.iter().enumerate() {
        let color = series_color(idx);
        let y = top + idx as i32 * line_height;
        area.draw(&PathElement::new(vec![(4, y), (22, y)], color.stroke_width(2)))?;
        area.draw(&Text::new(
            labeled.label.clone(),
            (28, y - font_size as i32 / 2),
            font.clone(),
        ))?;
    }
    Ok(())
}

fn trim_number(v: f64) -> String {
    let s = format!("{:.2}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

/// Crops away the white border, keeping `pad` pixels around the content.
pub fn tight_crop(img: &RgbImage, pad: u32) -> RgbImage {
    let white = image::Rgb([255u8, 255, 255]);
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in img.enumerate_pixels() {
        if *pixel == white {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    let Some((x0, y0, x1, y1)) = bounds else {
        return img.clone();
    };
    let x0 = x0.saturating_sub(pad);
    let y0 = y0.saturating_sub(pad);
    let x1 = (x1 + pad).min(img.width() - 1);
    let y1 = (y1 + pad).min(img.height() - 1);
    image::imageops::crop_imm(img, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image()
}

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(buffer.into_inner())
}

pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))
}
