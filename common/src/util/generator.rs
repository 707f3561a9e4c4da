use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufWriter, Write};

#[derive(Clone, Debug)]
pub struct GeneratorParams {
    pub columns: i32,
    pub rows: i32,
    /// Parallel wires per direction and length.
    pub tracks: u32,
    pub nets: usize,
    pub max_fanout: usize,
    /// Sinks are placed within this Manhattan radius of their source.
    pub radius: i32,
    pub seed: u64,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            columns: 20,
            rows: 20,
            tracks: 2,
            nets: 40,
            max_fanout: 4,
            radius: 6,
            seed: 1,
        }
    }
}

// (name prefix, class token, dx, dy, delay)
const WIRE_KINDS: [(&str, &str, i32, i32, f32); 10] = [
    ("E1", "SINGLE", 1, 0, 45.0),
    ("W1", "SINGLE", -1, 0, 45.0),
    ("N1", "SINGLE", 0, 1, 40.0),
    ("S1", "SINGLE", 0, -1, 40.0),
    ("E2", "DOUBLE", 2, 0, 70.0),
    ("W2", "DOUBLE", -2, 0, 70.0),
    ("N2", "DOUBLE", 0, 2, 65.0),
    ("S2", "DOUBLE", 0, -2, 65.0),
    ("N4", "VQUAD", 0, 4, 110.0),
    ("S4", "VQUAD", 0, -4, 110.0),
];

fn reverse_of(prefix: &str) -> &str {
    match prefix {
        "E1" => "W1",
        "W1" => "E1",
        "N1" => "S1",
        "S1" => "N1",
        "E2" => "W2",
        "W2" => "E2",
        "N2" => "S2",
        "S2" => "N2",
        "N4" => "S4",
        _ => "N4",
    }
}

/// Writes a random island-style grid fabric and a random netlist on top of it.
pub fn generate_random_design(
    fabric_file: &str,
    netlist_file: &str,
    params: &GeneratorParams,
) -> std::io::Result<()> {
    let mut fab = BufWriter::new(File::create(fabric_file)?);
    let mut nets = BufWriter::new(File::create(netlist_file)?);
    generate_to(params, &mut fab, &mut nets)?;
    fab.flush()?;
    nets.flush()
}

pub fn generate_to<F: Write, N: Write>(
    params: &GeneratorParams,
    fab: &mut F,
    nets: &mut N,
) -> std::io::Result<()> {
    let cols = params.columns.max(1);
    let rows = params.rows.max(1);
    let inside = |x: i32, y: i32| x >= 0 && x < cols && y >= 0 && y < rows;

    log::info!(
        "Generating Fabric: {}x{} tiles, {} tracks, {} nets (seed {})",
        cols,
        rows,
        params.tracks,
        params.nets,
        params.seed
    );

    writeln!(fab, "FABRIC {} {}", cols, rows)?;
    for y in 0..rows {
        for x in 0..cols {
            writeln!(fab, "V OUT_{x}_{y} SITE OUTPUT {x} {y} {x} {y} 0 20.0 -")?;
            writeln!(fab, "V IN_{x}_{y} INT PINFEED {x} {y} {x} {y} 0 15.0 -")?;
            writeln!(fab, "V BNC_{x}_{y} INT PINBOUNCE {x} {y} {x} {y} 0 15.0 -")?;
            for (prefix, class, dx, dy, delay) in WIRE_KINDS {
                if !inside(x + dx, y + dy) {
                    continue;
                }
                for t in 0..params.tracks {
                    writeln!(
                        fab,
                        "V {prefix}_{x}_{y}_{t} INT {class} {x} {y} {} {} 0 {delay:.1} -",
                        x + dx,
                        y + dy
                    )?;
                }
            }
        }
    }

    for y in 0..rows {
        for x in 0..cols {
            writeln!(fab, "E BNC_{x}_{y} IN_{x}_{y}")?;
            for (prefix, _, dx, dy, _) in WIRE_KINDS {
                if !inside(x + dx, y + dy) {
                    continue;
                }
                for t in 0..params.tracks {
                    writeln!(fab, "E OUT_{x}_{y} {prefix}_{x}_{y}_{t}")?;
                }
            }
            // wires ending in this tile
            for (prefix, _, dx, dy, _) in WIRE_KINDS {
                let (sx, sy) = (x - dx, y - dy);
                if !inside(sx, sy) {
                    continue;
                }
                for t in 0..params.tracks {
                    let from = format!("{prefix}_{sx}_{sy}_{t}");
                    writeln!(fab, "E {from} IN_{x}_{y}")?;
                    writeln!(fab, "E {from} BNC_{x}_{y}")?;
                    for (next, _, nx, ny, _) in WIRE_KINDS {
                        if next == reverse_of(prefix) || !inside(x + nx, y + ny) {
                            continue;
                        }
                        writeln!(fab, "E {from} {next}_{x}_{y}_{t}")?;
                    }
                }
            }
        }
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut sources: Vec<(i32, i32)> = (0..rows)
        .flat_map(|y| (0..cols).map(move |x| (x, y)))
        .collect();
    sources.shuffle(&mut rng);
    let mut sink_used = vec![false; (cols * rows) as usize];

    writeln!(nets, "DESIGN random")?;
    let mut written = 0;
    for &(sx, sy) in sources.iter() {
        if written == params.nets {
            break;
        }
        let fanout = rng.gen_range(1..=params.max_fanout.max(1));
        let mut sinks = Vec::new();
        for _ in 0..fanout * 4 {
            if sinks.len() == fanout {
                break;
            }
            let r = params.radius.max(1);
            let x = (sx + rng.gen_range(-r..=r)).clamp(0, cols - 1);
            let y = (sy + rng.gen_range(-r..=r)).clamp(0, rows - 1);
            let slot = (y * cols + x) as usize;
            if (x, y) == (sx, sy) || sink_used[slot] {
                continue;
            }
            sink_used[slot] = true;
            sinks.push((x, y));
        }
        if sinks.is_empty() {
            continue;
        }

        writeln!(nets, "NET n{}", written)?;
        writeln!(nets, "  SOURCE o OUT_{}_{}", sx, sy)?;
        for (i, (x, y)) in sinks.iter().enumerate() {
            writeln!(nets, "  SINK i{} IN_{}_{}", i, x, y)?;
        }
        writeln!(nets, "END")?;
        written += 1;
    }

    if written < params.nets {
        log::warn!(
            "Only {} of {} nets fit on the fabric.",
            written,
            params.nets
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::device::Device;
    use crate::db::parser::{fabric, netlist};

    #[test]
    fn generated_files_parse() {
        let params = GeneratorParams {
            columns: 6,
            rows: 5,
            tracks: 1,
            nets: 5,
            max_fanout: 3,
            radius: 3,
            seed: 7,
        };
        let mut fab = Vec::new();
        let mut nets = Vec::new();
        generate_to(&params, &mut fab, &mut nets).unwrap();

        let g = fabric::parse_str(std::str::from_utf8(&fab).unwrap()).unwrap();
        assert_eq!(g.columns(), 6);
        let d = netlist::parse_str(std::str::from_utf8(&nets).unwrap(), &g).unwrap();
        assert_eq!(d.num_nets(), 5);
        assert!(d.nets.iter().all(|n| n.source.is_some() && !n.sinks.is_empty()));
    }

    #[test]
    fn same_seed_same_output() {
        let params = GeneratorParams::default();
        let (mut a, mut b) = (Vec::new(), Vec::new());
        generate_to(&params, &mut Vec::new(), &mut a).unwrap();
        generate_to(&params, &mut Vec::new(), &mut b).unwrap();
        assert_eq!(a, b);
    }
}
