//! A dependency-free SVG renderer.
//!
//! Non-ground nodes sit on one row, left to right in first-seen order, with
//! the ground rail below them. Two-terminal symbols are drawn on the wire
//! between their nodes (parallel parts take successive lanes above the row);
//! multi-terminal parts are drawn as boxes above the row with one lead per pin.

use std::collections::HashMap;
use std::fmt::{self, Write};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use circuit_core::is_ground;
use log::debug;

use crate::request::{Placement, SchematicRequest};
use crate::symbol::Symbol;
use crate::Renderer;

const LEFT: f64 = 80.0;
const SPACING: f64 = 140.0;
const NODE_Y: f64 = 200.0;
const GROUND_Y: f64 = 340.0;
const LANE: f64 = 35.0;
/// Half the length of a two-terminal symbol body.
const BODY: f64 = 20.0;
const DEVICE_Y: f64 = 70.0;
const BOX_H: f64 = 56.0;
const BOX_MIN_W: f64 = 70.0;
const PIN_PITCH: f64 = 24.0;
const DEVICE_GAP: f64 = 30.0;
const LOOP: f64 = 70.0;

type Point = (f64, f64);

#[derive(Debug, Default, Clone, Copy)]
pub struct SvgRenderer;

impl Renderer for SvgRenderer {
    fn render(&self, request: &SchematicRequest) -> anyhow::Result<PathBuf> {
        check_format(&request.output)?;
        let svg = render_svg(request)?;
        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&request.output, svg)
            .with_context(|| format!("Failed to write {}", request.output.display()))?;
        debug!(
            "Wrote {} placements to {}",
            request.placements.len(),
            request.output.display()
        );
        Ok(request.output.clone())
    }
}

fn check_format(output: &Path) -> anyhow::Result<()> {
    match output
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
    {
        Some(ext) if ext == "svg" => Ok(()),
        Some(ext) => bail!("unsupported schematic format '{ext}'; this renderer writes .svg files"),
        None => bail!("output path {} has no file extension", output.display()),
    }
}

/// Render `request` as an SVG document.
pub fn render_svg(request: &SchematicRequest) -> Result<String, fmt::Error> {
    if request.placements.is_empty() {
        return empty_svg(&request.title);
    }

    let mut columns: Vec<&str> = Vec::new();
    for node in request.placements.iter().flat_map(|p| p.nodes.iter()) {
        if !is_ground(node) && !columns.contains(&node.as_str()) {
            columns.push(node);
        }
    }
    let index: HashMap<&str, usize> = columns.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    let mut canvas = Canvas::default();
    let mut lanes: HashMap<(String, String), usize> = HashMap::new();
    let mut next_device_x = LEFT - SPACING / 2.0;
    for placement in &request.placements {
        if placement.symbol.is_two_terminal() && placement.nodes.len() == 2 {
            let (a, b) = (&placement.nodes[0], &placement.nodes[1]);
            let key = if ground_key(a) <= ground_key(b) {
                (ground_key(a), ground_key(b))
            } else {
                (ground_key(b), ground_key(a))
            };
            let lane = lanes.entry(key).or_default();
            let route = route_two_terminal(&index, a, b, *lane);
            *lane += 1;
            canvas.two_terminal(placement, &route)?;
        } else {
            canvas.device(placement, &index, &mut next_device_x)?;
        }
    }

    for (i, node) in columns.iter().enumerate() {
        let x = column_x(i);
        canvas.extend(x);
        write!(
            canvas.body,
            r#"<circle cx="{}" cy="{}" r="3" fill="black"/>"#,
            n(x),
            n(NODE_Y)
        )?;
        canvas.text((x - 5.0, NODE_Y - 8.0), "end", node)?;
    }
    canvas.ground_rail()?;

    let width = n(canvas.max_x + 80.0);
    let height = n(GROUND_Y + 60.0);
    let mut svg = String::new();
    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="sans-serif" font-size="11">"#
    )?;
    writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
    writeln!(
        svg,
        r#"<text x="20" y="24" font-size="14" font-weight="bold" fill="black">{}</text>"#,
        escape(&request.title)
    )?;
    writeln!(svg, r#"<g fill="none" stroke="black" stroke-width="1.5">"#)?;
    svg.push_str(&canvas.body);
    writeln!(svg, "</g>")?;
    writeln!(svg, "</svg>")?;
    Ok(svg)
}

fn empty_svg(title: &str) -> Result<String, fmt::Error> {
    let mut svg = String::new();
    writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="240" height="120" viewBox="0 0 240 120" font-family="sans-serif">"#
    )?;
    writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
    writeln!(
        svg,
        r#"<text x="20" y="24" font-size="14" font-weight="bold">{}</text>"#,
        escape(title)
    )?;
    writeln!(
        svg,
        r#"<text x="120" y="72" text-anchor="middle" fill="gray">empty circuit</text>"#
    )?;
    writeln!(svg, "</svg>")?;
    Ok(svg)
}

fn ground_key(node: &str) -> String {
    if is_ground(node) {
        "0".to_string()
    } else {
        node.to_string()
    }
}

fn column_x(i: usize) -> f64 {
    LEFT + i as f64 * SPACING
}

/// Wire path from terminal `a` to terminal `b`. `lane` counts earlier parts
/// drawn between the same pair of nodes.
fn route_two_terminal(index: &HashMap<&str, usize>, a: &str, b: &str, lane: usize) -> Vec<Point> {
    let column = |node: &str| (!is_ground(node)).then(|| index.get(node).copied()).flatten();
    let to_ground = |i: usize| {
        let x = column_x(i);
        let dx = LANE * lane as f64;
        dedup(vec![(x, NODE_Y), (x + dx, NODE_Y), (x + dx, GROUND_Y)])
    };
    match (column(a), column(b)) {
        (Some(i), Some(j)) if i != j => {
            let (xa, xb) = (column_x(i), column_x(j));
            let level = lane + usize::from(i.abs_diff(j) > 1);
            if level == 0 {
                vec![(xa, NODE_Y), (xb, NODE_Y)]
            } else {
                let h = NODE_Y - LANE * level as f64;
                vec![(xa, NODE_Y), (xa, h), (xb, h), (xb, NODE_Y)]
            }
        }
        (Some(i), None) => to_ground(i),
        (None, Some(j)) => {
            let mut route = to_ground(j);
            route.reverse();
            route
        }
        (Some(i), Some(_)) => self_loop((column_x(i), NODE_Y), lane),
        (None, None) => self_loop((LEFT - SPACING / 2.0, GROUND_Y), lane),
    }
}

/// Both terminals on the same node.
fn self_loop(p: Point, lane: usize) -> Vec<Point> {
    let h = p.1 - LOOP - LANE * lane as f64;
    vec![p, (p.0, h), (p.0 + LOOP, h), (p.0 + LOOP, p.1), p]
}

fn dedup(mut route: Vec<Point>) -> Vec<Point> {
    route.dedup();
    route
}

/// Round to one decimal for compact output.
fn n(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn glyph(symbol: Symbol) -> &'static str {
    match symbol {
        Symbol::Resistor => r#"<polyline points="-20,0 -15,-7 -9,7 -3,-7 3,7 9,-7 15,7 20,0"/>"#,
        Symbol::Capacitor => {
            r#"<path d="M-20,0 H-4 M-4,-12 V12 M4,-12 V12 M4,0 H20"/>"#
        }
        Symbol::Inductor => {
            r#"<path d="M-20,0 a5,5 0 0 1 10,0 a5,5 0 0 1 10,0 a5,5 0 0 1 10,0 a5,5 0 0 1 10,0"/>"#
        }
        Symbol::VoltageSource => {
            r#"<path d="M-20,0 H-14 M14,0 H20 M-10,0 H-4 M-7,-3 V3 M4,0 H10"/><circle r="14"/>"#
        }
        Symbol::CurrentSource => {
            r#"<path d="M-20,0 H-14 M14,0 H20 M-8,0 H8 M3,-4 L8,0 L3,4"/><circle r="14"/>"#
        }
        Symbol::Diode => r#"<path d="M-20,0 H-8 M8,0 H20 M-8,-9 L-8,9 L8,0 Z M8,-9 V9"/>"#,
        _ => r#"<rect x="-20" y="-10" width="40" height="20" stroke-dasharray="4 2"/>"#,
    }
}

#[derive(Default)]
struct Canvas {
    body: String,
    max_x: f64,
    /// Horizontal extent of everything touching the ground rail.
    ground: Option<(f64, f64)>,
}

impl Canvas {
    fn extend(&mut self, x: f64) {
        self.max_x = self.max_x.max(x);
    }

    fn touch(&mut self, (x, y): Point) {
        self.extend(x);
        if y == GROUND_Y {
            self.ground = Some(match self.ground {
                Some((lo, hi)) => (lo.min(x), hi.max(x)),
                None => (x, x),
            });
        }
    }

    fn wire(&mut self, route: &[Point]) -> fmt::Result {
        if route.len() < 2 {
            return Ok(());
        }
        for p in route {
            self.touch(*p);
        }
        let points: Vec<String> = route.iter().map(|(x, y)| format!("{},{}", n(*x), n(*y))).collect();
        writeln!(self.body, r#"<polyline points="{}"/>"#, points.join(" "))
    }

    fn text(&mut self, (x, y): Point, anchor: &str, content: &str) -> fmt::Result {
        writeln!(
            self.body,
            r#"<text x="{}" y="{}" text-anchor="{anchor}" fill="black" stroke="none">{}</text>"#,
            n(x),
            n(y),
            escape(content)
        )
    }

    fn two_terminal(&mut self, placement: &Placement, route: &[Point]) -> fmt::Result {
        let mut seg = 0;
        let mut longest = 0.0;
        for (i, w) in route.windows(2).enumerate() {
            let len = (w[1].0 - w[0].0).hypot(w[1].1 - w[0].1);
            if len > longest {
                longest = len;
                seg = i;
            }
        }
        let (s, e) = (route[seg], route[seg + 1]);
        let (dx, dy) = (e.0 - s.0, e.1 - s.1);
        let u = (dx / longest, dy / longest);
        let c = ((s.0 + e.0) / 2.0, (s.1 + e.1) / 2.0);

        let mut head = route[..=seg].to_vec();
        head.push((c.0 - u.0 * BODY, c.1 - u.1 * BODY));
        let mut tail = vec![(c.0 + u.0 * BODY, c.1 + u.1 * BODY)];
        tail.extend_from_slice(&route[seg + 1..]);
        self.wire(&head)?;
        self.wire(&tail)?;

        let angle = dy.atan2(dx).to_degrees().round();
        writeln!(
            self.body,
            r#"<g transform="translate({} {}) rotate({angle})">{}</g>"#,
            n(c.0),
            n(c.1),
            glyph(placement.symbol)
        )?;
        if dy.abs() < f64::EPSILON {
            self.text((c.0, c.1 - 18.0), "middle", &placement.designator)?;
            self.text((c.0, c.1 + 26.0), "middle", &placement.label)
        } else {
            self.text((c.0 + 18.0, c.1 - 4.0), "start", &placement.designator)?;
            self.text((c.0 + 18.0, c.1 + 12.0), "start", &placement.label)
        }
    }

    fn device(
        &mut self,
        placement: &Placement,
        index: &HashMap<&str, usize>,
        next_x: &mut f64,
    ) -> fmt::Result {
        let pins = placement.nodes.len();
        let width = BOX_MIN_W.max((pins + 1) as f64 * PIN_PITCH);
        let xs: Vec<f64> = placement
            .nodes
            .iter()
            .filter(|node| !is_ground(node))
            .filter_map(|node| index.get(node.as_str()).map(|i| column_x(*i)))
            .collect();
        let preferred = if xs.is_empty() {
            *next_x + width / 2.0
        } else {
            xs.iter().sum::<f64>() / xs.len() as f64
        };
        let center = preferred.max(*next_x + width / 2.0);
        *next_x = center + width / 2.0 + DEVICE_GAP;

        let (left, top) = (center - width / 2.0, DEVICE_Y - BOX_H / 2.0);
        let bottom = top + BOX_H;
        self.extend(left + width);
        writeln!(
            self.body,
            r#"<rect x="{}" y="{}" width="{}" height="{}"{}/>"#,
            n(left),
            n(top),
            n(width),
            n(BOX_H),
            if placement.symbol == Symbol::Placeholder {
                r#" stroke-dasharray="4 2""#
            } else {
                ""
            }
        )?;
        self.text((center, top - 6.0), "middle", &placement.designator)?;
        self.text((center, DEVICE_Y - 6.0), "middle", placement.symbol.caption())?;
        self.text((center, DEVICE_Y + 8.0), "middle", &placement.label)?;

        for (i, node) in placement.nodes.iter().enumerate() {
            let px = left + (i + 1) as f64 * width / (pins + 1) as f64;
            self.text((px, bottom - 4.0), "middle", &placement.pins[i])?;
            let route = match index.get(node.as_str()) {
                Some(column) if !is_ground(node) => {
                    let jog = bottom + 14.0 + 8.0 * i as f64;
                    let tx = column_x(*column);
                    dedup(vec![(px, bottom), (px, jog), (tx, jog), (tx, NODE_Y)])
                }
                _ => vec![(px, bottom), (px, GROUND_Y)],
            };
            self.wire(&route)?;
        }
        Ok(())
    }

    fn ground_rail(&mut self) -> fmt::Result {
        let Some((lo, hi)) = self.ground else {
            return Ok(());
        };
        let (lo, hi) = (lo - 20.0, hi + 20.0);
        self.extend(hi);
        writeln!(
            self.body,
            r#"<path d="M{lo},{y} H{hi} M{lo},{y} V{y1} M{a},{y1} H{b} M{c},{y2} H{d} M{e},{y3} H{f}"/>"#,
            lo = n(lo),
            hi = n(hi),
            y = n(GROUND_Y),
            y1 = n(GROUND_Y + 10.0),
            y2 = n(GROUND_Y + 15.0),
            y3 = n(GROUND_Y + 20.0),
            a = n(lo - 12.0),
            b = n(lo + 12.0),
            c = n(lo - 8.0),
            d = n(lo + 8.0),
            e = n(lo - 4.0),
            f = n(lo + 4.0),
        )?;
        self.text((lo - 16.0, GROUND_Y + 4.0), "end", "0")
    }
}
