//! Shape-approximation stylization.
//!
//! The image is rebuilt from a flat background plus `iterations` translucent
//! shapes. Each shape is found by hill climbing: a batch of random candidates
//! is scored, the best one is mutated while mutations keep lowering the
//! error, and the winner is composited onto the canvas. A shape's colour is
//! not searched for; it is the colour that minimises the squared error under
//! the shape for the requested alpha.
//!
//! Fitting runs on a working copy no larger than [`WORKING_EDGE`]; the
//! fitted shapes are then scaled and painted at the output resolution. The
//! RNG is seeded with a constant, so the same input always gives the same
//! picture.

use super::backend::Dimensions;
use super::calculations::working_dimensions;
use super::params::{PrimitiveMode, PrimitiveParams};
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Longer edge of the working copy the shapes are fitted on.
pub const WORKING_EDGE: u32 = 256;

/// Animated output never has more frames than this.
pub const MAX_FRAMES: usize = 50;

const CANDIDATES: usize = 48;
const MUTATIONS: usize = 64;
const SEED: u64 = 0x1111_5eed;

type Color = [f32; 3];

/// Half-open horizontal run of pixels `[x0, x1)` on row `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    y: u32,
    x0: u32,
    x1: u32,
}

/// Concrete outline of a shape in pixel space.
#[derive(Debug, Clone, PartialEq)]
enum Geometry {
    Polygon(Vec<(f32, f32)>),
    Ellipse { cx: f32, cy: f32, rx: f32, ry: f32 },
}

impl Geometry {
    fn scaled(&self, sx: f32, sy: f32) -> Geometry {
        match self {
            Geometry::Polygon(points) => {
                Geometry::Polygon(points.iter().map(|&(x, y)| (x * sx, y * sy)).collect())
            }
            Geometry::Ellipse { cx, cy, rx, ry } => Geometry::Ellipse {
                cx: cx * sx,
                cy: cy * sy,
                rx: rx * sx,
                ry: ry * sy,
            },
        }
    }

    /// Rows covered by the shape, clipped to a `width` x `height` canvas.
    /// A pixel is inside when its centre is.
    fn spans(&self, width: u32, height: u32) -> Vec<Span> {
        let (ymin, ymax) = match self {
            Geometry::Polygon(points) => points.iter().fold(
                (f32::INFINITY, f32::NEG_INFINITY),
                |(lo, hi), &(_, y)| (lo.min(y), hi.max(y)),
            ),
            Geometry::Ellipse { cy, ry, .. } => (cy - ry, cy + ry),
        };
        let first = (ymin - 0.5).ceil().max(0.0);
        let last = (ymax - 0.5).floor().min(height as f32 - 1.0);
        if first.is_nan() || last.is_nan() || first > last {
            return Vec::new();
        }

        let mut spans = Vec::new();
        for y in first as u32..=last as u32 {
            let centre = y as f32 + 0.5;
            let Some((lo, hi)) = self.row_extent(centre) else {
                continue;
            };
            let x0 = (lo - 0.5).ceil().max(0.0);
            let x1 = (hi - 0.5).floor().min(width as f32 - 1.0);
            if x0 <= x1 {
                spans.push(Span {
                    y,
                    x0: x0 as u32,
                    x1: x1 as u32 + 1,
                });
            }
        }
        spans
    }

    /// Horizontal extent of the shape on the line `y = row`.
    fn row_extent(&self, row: f32) -> Option<(f32, f32)> {
        match self {
            Geometry::Polygon(points) => {
                let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
                for (i, &(ax, ay)) in points.iter().enumerate() {
                    let (bx, by) = points[(i + 1) % points.len()];
                    if (ay <= row && by >= row) || (by <= row && ay >= row) {
                        if ay == by {
                            lo = lo.min(ax.min(bx));
                            hi = hi.max(ax.max(bx));
                        } else {
                            let x = ax + (row - ay) / (by - ay) * (bx - ax);
                            lo = lo.min(x);
                            hi = hi.max(x);
                        }
                    }
                }
                (lo <= hi).then_some((lo, hi))
            }
            Geometry::Ellipse { cx, cy, rx, ry } => {
                let dy = (row - cy) / ry;
                if dy.abs() > 1.0 {
                    return None;
                }
                let half = rx * (1.0 - dy * dy).sqrt();
                Some((cx - half, cx + half))
            }
        }
    }
}

/// Parametric shape, mutated during the search.
#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Triangle([(f32, f32); 3]),
    Rectangle { x0: f32, y0: f32, x1: f32, y1: f32 },
    Ellipse { cx: f32, cy: f32, rx: f32, ry: f32 },
    Circle { cx: f32, cy: f32, r: f32 },
    RotatedRectangle { cx: f32, cy: f32, hw: f32, hh: f32, angle: f32 },
}

/// Bounds shape sizes and mutation steps for a working canvas.
struct Field {
    width: f32,
    height: f32,
    spread: f32,
}

impl Field {
    fn new(dims: Dimensions) -> Self {
        let (width, height) = (dims.width as f32, dims.height as f32);
        Self {
            width,
            height,
            spread: (width.max(height) / 6.0).max(2.0),
        }
    }

    fn point(&self, rng: &mut StdRng) -> (f32, f32) {
        (rng.gen_range(0.0..self.width), rng.gen_range(0.0..self.height))
    }

    fn extent(&self, rng: &mut StdRng) -> f32 {
        rng.gen_range(1.0..self.spread)
    }

    fn nudge(&self, rng: &mut StdRng) -> f32 {
        let step = self.spread / 3.0;
        rng.gen_range(-step..step)
    }

    fn clamp_point(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (x.clamp(0.0, self.width), y.clamp(0.0, self.height))
    }
}

impl Shape {
    fn random(mode: PrimitiveMode, field: &Field, rng: &mut StdRng) -> Shape {
        let mode = match mode {
            PrimitiveMode::Combo => {
                PrimitiveMode::from_index(rng.gen_range(1..=5)).unwrap_or(PrimitiveMode::Triangle)
            }
            other => other,
        };
        let (cx, cy) = field.point(rng);
        match mode {
            PrimitiveMode::Combo | PrimitiveMode::Triangle => {
                let mut corner = || {
                    field.clamp_point((
                        cx + field.nudge(rng) * 3.0,
                        cy + field.nudge(rng) * 3.0,
                    ))
                };
                Shape::Triangle([(cx, cy), corner(), corner()])
            }
            PrimitiveMode::Rectangle => {
                let (x1, y1) = field.clamp_point((cx + field.extent(rng), cy + field.extent(rng)));
                Shape::Rectangle {
                    x0: cx,
                    y0: cy,
                    x1,
                    y1,
                }
            }
            PrimitiveMode::Ellipse => Shape::Ellipse {
                cx,
                cy,
                rx: field.extent(rng),
                ry: field.extent(rng),
            },
            PrimitiveMode::Circle => Shape::Circle {
                cx,
                cy,
                r: field.extent(rng),
            },
            PrimitiveMode::RotatedRectangle => Shape::RotatedRectangle {
                cx,
                cy,
                hw: field.extent(rng),
                hh: field.extent(rng),
                angle: rng.gen_range(0.0..180.0),
            },
        }
    }

    fn mutate(&self, field: &Field, rng: &mut StdRng) -> Shape {
        let grow = |value: f32, rng: &mut StdRng| (value + field.nudge(rng)).max(1.0);
        let mut shape = self.clone();
        match &mut shape {
            Shape::Triangle(points) => {
                let i = rng.gen_range(0..3);
                let (x, y) = points[i];
                points[i] = field.clamp_point((x + field.nudge(rng), y + field.nudge(rng)));
            }
            Shape::Rectangle { x0, y0, x1, y1 } => {
                if rng.gen_bool(0.5) {
                    (*x0, *y0) = field.clamp_point((*x0 + field.nudge(rng), *y0 + field.nudge(rng)));
                } else {
                    (*x1, *y1) = field.clamp_point((*x1 + field.nudge(rng), *y1 + field.nudge(rng)));
                }
            }
            Shape::Ellipse { cx, cy, rx, ry } => match rng.gen_range(0..3) {
                0 => (*cx, *cy) = field.clamp_point((*cx + field.nudge(rng), *cy + field.nudge(rng))),
                1 => *rx = grow(*rx, rng),
                _ => *ry = grow(*ry, rng),
            },
            Shape::Circle { cx, cy, r } => {
                if rng.gen_bool(0.5) {
                    (*cx, *cy) = field.clamp_point((*cx + field.nudge(rng), *cy + field.nudge(rng)));
                } else {
                    *r = grow(*r, rng);
                }
            }
            Shape::RotatedRectangle {
                cx,
                cy,
                hw,
                hh,
                angle,
            } => match rng.gen_range(0..4) {
                0 => (*cx, *cy) = field.clamp_point((*cx + field.nudge(rng), *cy + field.nudge(rng))),
                1 => *hw = grow(*hw, rng),
                2 => *hh = grow(*hh, rng),
                _ => *angle += rng.gen_range(-15.0..15.0),
            },
        }
        shape
    }

    fn geometry(&self) -> Geometry {
        match *self {
            Shape::Triangle(points) => Geometry::Polygon(points.to_vec()),
            Shape::Rectangle { x0, y0, x1, y1 } => Geometry::Polygon(vec![
                (x0.min(x1), y0.min(y1)),
                (x0.max(x1), y0.min(y1)),
                (x0.max(x1), y0.max(y1)),
                (x0.min(x1), y0.max(y1)),
            ]),
            Shape::Ellipse { cx, cy, rx, ry } => Geometry::Ellipse { cx, cy, rx, ry },
            Shape::Circle { cx, cy, r } => Geometry::Ellipse {
                cx,
                cy,
                rx: r,
                ry: r,
            },
            Shape::RotatedRectangle {
                cx,
                cy,
                hw,
                hh,
                angle,
            } => {
                let (sin, cos) = angle.to_radians().sin_cos();
                let corner = |dx: f32, dy: f32| (cx + dx * cos - dy * sin, cy + dx * sin + dy * cos);
                Geometry::Polygon(vec![
                    corner(-hw, -hh),
                    corner(hw, -hh),
                    corner(hw, hh),
                    corner(-hw, hh),
                ])
            }
        }
    }
}

/// A shape placed on the canvas with its fill colour.
#[derive(Debug, Clone)]
struct Placed {
    geometry: Geometry,
    color: Color,
}

/// Working-resolution RGB buffer.
struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl Canvas {
    fn from_image(img: &RgbImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            pixels: img
                .pixels()
                .map(|p| [p.0[0] as f32, p.0[1] as f32, p.0[2] as f32])
                .collect(),
        }
    }

    fn filled(width: u32, height: u32, color: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; (width * height) as usize],
        }
    }

    fn index(&self, y: u32, x: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        (y * self.width + x) as usize
    }

    fn average(&self) -> Color {
        let n = self.pixels.len().max(1) as f32;
        let sum = self.pixels.iter().fold([0.0f32; 3], |acc, p| {
            [acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]]
        });
        [sum[0] / n, sum[1] / n, sum[2] / n]
    }

    fn blend(&mut self, spans: &[Span], color: Color, alpha: f32) {
        for span in spans {
            for x in span.x0..span.x1 {
                let i = self.index(span.y, x);
                for c in 0..3 {
                    self.pixels[i][c] = self.pixels[i][c] * (1.0 - alpha) + color[c] * alpha;
                }
            }
        }
    }

    /// Sum of squared differences against `target`.
    #[cfg(test)]
    fn error(&self, target: &Canvas) -> f64 {
        self.pixels
            .iter()
            .zip(&target.pixels)
            .map(|(a, b)| {
                (0..3)
                    .map(|c| ((a[c] - b[c]) as f64).powi(2))
                    .sum::<f64>()
            })
            .sum()
    }
}

/// Colour minimising the error under `spans`, and the error change it causes.
fn evaluate(spans: &[Span], target: &Canvas, current: &Canvas, alpha: f32) -> Option<(f64, Color)> {
    let mut sum = [0.0f64; 3];
    let mut count = 0usize;
    for span in spans {
        for x in span.x0..span.x1 {
            let i = current.index(span.y, x);
            for c in 0..3 {
                let wanted = (target.pixels[i][c] - current.pixels[i][c] * (1.0 - alpha)) / alpha;
                sum[c] += wanted as f64;
            }
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let color = sum.map(|s| (s / count as f64).clamp(0.0, 255.0) as f32);

    let mut delta = 0.0f64;
    for span in spans {
        for x in span.x0..span.x1 {
            let i = current.index(span.y, x);
            for c in 0..3 {
                let t = target.pixels[i][c];
                let before = current.pixels[i][c];
                let after = before * (1.0 - alpha) + color[c] * alpha;
                delta += ((t - after) as f64).powi(2) - ((t - before) as f64).powi(2);
            }
        }
    }
    Some((delta, color))
}

/// Fitted shapes on a working canvas.
struct Model {
    dims: Dimensions,
    background: Color,
    alpha: f32,
    shapes: Vec<Placed>,
}

impl Model {
    fn fit(img: &DynamicImage, params: &PrimitiveParams) -> Self {
        let work = working_dimensions(Dimensions::new(img.width(), img.height()), WORKING_EDGE);
        let target = Canvas::from_image(
            &img.resize_exact(work.width, work.height, FilterType::Triangle)
                .to_rgb8(),
        );
        let background = target.average();
        let alpha = params.alpha as f32 / 255.0;
        let field = Field::new(work);
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut current = Canvas::filled(work.width, work.height, background);
        let mut shapes = Vec::with_capacity(params.iterations as usize);

        for _ in 0..params.iterations {
            let mut best: Option<(f64, Shape, Color)> = None;
            let consider = |shape: Shape, best: &mut Option<(f64, Shape, Color)>| {
                let spans = shape.geometry().spans(work.width, work.height);
                if let Some((delta, color)) = evaluate(&spans, &target, &current, alpha) {
                    if best.as_ref().is_none_or(|(d, _, _)| delta < *d) {
                        *best = Some((delta, shape, color));
                    }
                }
            };
            for _ in 0..CANDIDATES {
                consider(Shape::random(params.mode, &field, &mut rng), &mut best);
            }
            for _ in 0..MUTATIONS {
                let Some((_, shape, _)) = &best else { break };
                let mutated = shape.mutate(&field, &mut rng);
                consider(mutated, &mut best);
            }

            let Some((_, shape, color)) = best else {
                continue;
            };
            let geometry = shape.geometry();
            current.blend(&geometry.spans(work.width, work.height), color, alpha);
            shapes.push(Placed { geometry, color });
        }

        Self {
            dims: work,
            background,
            alpha,
            shapes,
        }
    }

    fn blank(&self, width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(self.background.map(|c| c.round() as u8)))
    }

    fn paint(&self, canvas: &mut RgbImage, shape: &Placed) {
        let sx = canvas.width() as f32 / self.dims.width as f32;
        let sy = canvas.height() as f32 / self.dims.height as f32;
        let spans = shape.geometry.scaled(sx, sy).spans(canvas.width(), canvas.height());
        for span in spans {
            for x in span.x0..span.x1 {
                let pixel = canvas.get_pixel_mut(x, span.y);
                for c in 0..3 {
                    let blended =
                        pixel.0[c] as f32 * (1.0 - self.alpha) + shape.color[c] * self.alpha;
                    pixel.0[c] = blended.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

/// Stylize `img` into a single still at its own resolution.
pub fn render(img: &DynamicImage, params: &PrimitiveParams) -> DynamicImage {
    let model = Model::fit(img, params);
    let mut canvas = model.blank(img.width(), img.height());
    for shape in &model.shapes {
        model.paint(&mut canvas, shape);
    }
    DynamicImage::ImageRgb8(canvas)
}

/// Stylize `img` as a sequence of frames, one per shape added.
///
/// Long runs are sampled evenly down to [`MAX_FRAMES`]; the last frame is
/// always the finished picture.
pub fn render_frames(img: &DynamicImage, params: &PrimitiveParams) -> Vec<RgbImage> {
    let model = Model::fit(img, params);
    let mut canvas = model.blank(img.width(), img.height());
    let total = model.shapes.len();
    if total == 0 {
        return vec![canvas];
    }
    let every = total.div_ceil(MAX_FRAMES);

    let mut frames = Vec::with_capacity(total.min(MAX_FRAMES));
    for (i, shape) in model.shapes.iter().enumerate() {
        model.paint(&mut canvas, shape);
        let done = i + 1;
        if done % every == 0 || done == total {
            frames.push(canvas.clone());
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: PrimitiveMode, iterations: u32) -> PrimitiveParams {
        PrimitiveParams {
            mode,
            iterations,
            alpha: 128,
        }
    }

    fn quadrants() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, y| match (x < 32, y < 24) {
            (true, true) => Rgb([220, 30, 30]),
            (false, true) => Rgb([30, 220, 30]),
            (true, false) => Rgb([30, 30, 220]),
            (false, false) => Rgb([240, 240, 240]),
        }))
    }

    fn working_error(reference: &DynamicImage, candidate: &DynamicImage) -> f64 {
        let work = working_dimensions(
            Dimensions::new(reference.width(), reference.height()),
            WORKING_EDGE,
        );
        let shrink = |img: &DynamicImage| {
            Canvas::from_image(
                &img.resize_exact(work.width, work.height, FilterType::Triangle)
                    .to_rgb8(),
            )
        };
        shrink(candidate).error(&shrink(reference))
    }

    #[test]
    fn render_keeps_dimensions() {
        let out = render(&quadrants(), &params(PrimitiveMode::Triangle, 5));
        assert_eq!((out.width(), out.height()), (64, 48));
    }

    #[test]
    fn render_is_deterministic() {
        let p = params(PrimitiveMode::Combo, 8);
        let a = render(&quadrants(), &p);
        let b = render(&quadrants(), &p);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn shapes_reduce_error_against_flat_background() {
        let source = quadrants();
        let flat = render(&source, &params(PrimitiveMode::Rectangle, 0));
        let shaped = render(&source, &params(PrimitiveMode::Rectangle, 20));
        assert!(working_error(&source, &shaped) < working_error(&source, &flat));
    }

    #[test]
    fn every_mode_renders() {
        for index in 0..=5 {
            let mode = PrimitiveMode::from_index(index).unwrap();
            let out = render(&quadrants(), &params(mode, 3));
            assert_eq!((out.width(), out.height()), (64, 48), "mode {index}");
        }
    }

    #[test]
    fn large_images_render_at_full_resolution() {
        let big = DynamicImage::ImageRgb8(RgbImage::from_pixel(600, 300, Rgb([10, 20, 30])));
        let out = render(&big, &params(PrimitiveMode::Circle, 2));
        assert_eq!((out.width(), out.height()), (600, 300));
    }

    #[test]
    fn frames_follow_shape_count() {
        let frames = render_frames(&quadrants(), &params(PrimitiveMode::Ellipse, 6));
        assert_eq!(frames.len(), 6);
        assert!(frames.iter().all(|f| f.dimensions() == (64, 48)));
    }

    #[test]
    fn frames_are_capped() {
        let frames = render_frames(&quadrants(), &params(PrimitiveMode::Triangle, 120));
        assert!(frames.len() <= MAX_FRAMES);
        let last = frames.last().unwrap();
        assert_eq!(last, &render(&quadrants(), &params(PrimitiveMode::Triangle, 120)).to_rgb8());
    }

    #[test]
    fn polygon_spans_cover_pixel_centres() {
        let square = Geometry::Polygon(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)]);
        let spans = square.spans(10, 10);
        assert_eq!(spans.len(), 4);
        assert!(spans.iter().all(|s| s.x0 == 0 && s.x1 == 4));
    }

    #[test]
    fn spans_are_clipped_to_canvas() {
        let ellipse = Geometry::Ellipse {
            cx: 0.0,
            cy: 0.0,
            rx: 10.0,
            ry: 10.0,
        };
        let spans = ellipse.spans(5, 5);
        assert!(spans.iter().all(|s| s.x1 <= 5 && s.y < 5));
        assert!(!spans.is_empty());
    }
}
