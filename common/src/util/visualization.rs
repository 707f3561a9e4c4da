use crate::db::core::Design;
use crate::db::device::Device;
use image::{ImageResult, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect as ImageRect;
use std::collections::HashSet;
use std::path::Path;

/// Counts routed vertices per tile, keyed by the tile where each vertex ends.
pub fn tile_usage(design: &Design, device: &dyn Device) -> Vec<u32> {
    let cols = device.columns().max(1) as usize;
    let rows = device.rows().max(1) as usize;
    let mut usage = vec![0u32; cols * rows];

    let mut seen = HashSet::new();
    for net in &design.nets {
        for &(a, b) in &net.edges {
            for v in [a, b] {
                if !seen.insert(v) {
                    continue;
                }
                let p = device.end_of(v);
                if p.x >= 0 && (p.x as usize) < cols && p.y >= 0 && (p.y as usize) < rows {
                    usage[p.y as usize * cols + p.x as usize] += 1;
                }
            }
        }
    }
    usage
}

fn heat_color(t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        let k = t * 2.0;
        Rgb([(40.0 + 215.0 * k) as u8, (40.0 + 60.0 * k) as u8, (90.0 * (1.0 - k)) as u8])
    } else {
        let k = (t - 0.5) * 2.0;
        Rgb([255, (100.0 + 155.0 * k) as u8, (60.0 * k) as u8])
    }
}

pub fn draw_usage_heat_map(
    design: &Design,
    device: &dyn Device,
    filename: &str,
    size: u32,
) -> ImageResult<()> {
    let cols = device.columns().max(1) as u32;
    let rows = device.rows().max(1) as u32;
    let usage = tile_usage(design, device);
    let peak = usage.iter().copied().max().unwrap_or(0).max(1) as f32;

    let cell = (size / cols.max(rows)).max(2);
    let w = cell * cols;
    let h = cell * rows;
    let mut img = RgbImage::from_pixel(w, h, Rgb([20, 20, 20]));

    for y in 0..rows {
        for x in 0..cols {
            let count = usage[(y * cols + x) as usize];
            if count == 0 {
                continue;
            }
            // row 0 at the bottom
            let top = (rows - 1 - y) * cell;
            let rect = ImageRect::at((x * cell) as i32, top as i32).of_size(cell, cell);
            draw_filled_rect_mut(&mut img, rect, heat_color(count as f32 / peak));
        }
    }

    let grid = Rgb([60, 60, 60]);
    for x in 0..=cols {
        let px = (x * cell).min(w - 1) as f32;
        draw_line_segment_mut(&mut img, (px, 0.0), (px, (h - 1) as f32), grid);
    }
    for y in 0..=rows {
        let py = (y * cell).min(h - 1) as f32;
        draw_line_segment_mut(&mut img, (0.0, py), ((w - 1) as f32, py), grid);
    }

    img.save(Path::new(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::core::NetKind;
    use crate::db::device::{FabricBuilder, ResourceClass, TileClass, VertexSpec};
    use crate::geom::coord::TileCoord;

    #[test]
    fn usage_counts_each_vertex_once() {
        let mut b = FabricBuilder::new(2, 1);
        let mk = |n: &str, x| {
            VertexSpec::new(
                n,
                TileClass::Interconnect,
                ResourceClass::Single,
                TileCoord::new(x, 0),
                TileCoord::new(x, 0),
            )
        };
        let a = b.add_vertex(mk("a", 0)).unwrap();
        let c = b.add_vertex(mk("c", 1)).unwrap();
        let g = b.build().unwrap();

        let mut d = Design::new("t");
        let n = d.add_net("n", NetKind::Wire);
        d.nets[n.index()].edges = vec![(a, c), (a, c)];
        assert_eq!(tile_usage(&d, &g), vec![1, 1]);
    }

    #[test]
    fn heat_ramp_is_monotone_in_red() {
        assert!(heat_color(0.0).0[0] < heat_color(0.4).0[0]);
        assert_eq!(heat_color(1.0).0[0], 255);
    }
}
