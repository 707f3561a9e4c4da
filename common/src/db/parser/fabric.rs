use crate::db::device::{FabricBuilder, FabricGraph, VertexSpec};
use crate::geom::coord::TileCoord;
use anyhow::{Context, Result, anyhow, bail};
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Reads a `.fab` connectivity file.
///
/// ```text
/// FABRIC <columns> <rows>
/// SLL <length>
/// LAGUNA <column> <column> ...
/// V <name> <tile> <class> <bx> <by> <ex> <ey> <slr> <delay> [UTURN] [RCLK]
/// E <from> <to> [RT]
/// ```
pub fn parse(filename: &str) -> Result<FabricGraph> {
    let file = File::open(filename).with_context(|| format!("opening {}", filename))?;
    parse_reader(BufReader::new(file))
}

pub fn parse_str(text: &str) -> Result<FabricGraph> {
    parse_reader(text.as_bytes())
}

fn parse_reader<R: BufRead>(reader: R) -> Result<FabricGraph> {
    let mut builder = FabricBuilder::new(0, 0);
    let mut seen_header = false;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() || parts[0].starts_with('#') {
            continue;
        }
        let at = line_no + 1;

        match parts[0] {
            "FABRIC" => {
                if parts.len() < 3 {
                    bail!("line {}: FABRIC needs <columns> <rows>", at);
                }
                builder.set_size(parts[1].parse()?, parts[2].parse()?);
                seen_header = true;
            }
            "SLL" => {
                let len = parts
                    .get(1)
                    .ok_or_else(|| anyhow!("line {}: SLL needs a length", at))?;
                builder.set_super_long_line_length(len.parse()?);
            }
            "LAGUNA" => {
                let cols = parts[1..]
                    .iter()
                    .map(|p| p.parse::<i32>())
                    .collect::<Result<Vec<_>, _>>()
                    .with_context(|| format!("line {}: bad LAGUNA column", at))?;
                builder.set_laguna_columns(cols);
            }
            "V" => {
                if parts.len() < 11 {
                    bail!("line {}: vertex record has {} fields, expected 11", at, parts.len());
                }
                let mut spec = VertexSpec::new(
                    parts[1],
                    parts[2].parse()?,
                    parts[3].parse()?,
                    TileCoord::new(parts[4].parse()?, parts[5].parse()?),
                    TileCoord::new(parts[6].parse()?, parts[7].parse()?),
                )
                .with_slr(parts[8].parse()?)
                .with_delay(parts[9].parse()?);
                for flag in &parts[10..] {
                    match *flag {
                        "UTURN" => spec.u_turn = true,
                        "RCLK" => spec.crosses_clock = true,
                        "-" => {}
                        other => bail!("line {}: unknown vertex flag '{}'", at, other),
                    }
                }
                builder.add_vertex(spec)?;
            }
            "E" => {
                if parts.len() < 3 {
                    bail!("line {}: edge needs <from> <to>", at);
                }
                let from = builder
                    .vertex_by_name(parts[1])
                    .ok_or_else(|| anyhow!("line {}: unknown vertex '{}'", at, parts[1]))?;
                let to = builder
                    .vertex_by_name(parts[2])
                    .ok_or_else(|| anyhow!("line {}: unknown vertex '{}'", at, parts[2]))?;
                if parts.get(3) == Some(&"RT") {
                    builder.add_route_through(from, to);
                } else {
                    builder.add_edge(from, to);
                }
            }
            other => bail!("line {}: unknown record '{}'", at, other),
        }
    }

    if !seen_header {
        bail!("missing FABRIC header");
    }
    Ok(builder.build()?)
}
