use crate::db::core::{Design, NetKind};
use crate::db::device::FabricGraph;
use crate::db::indices::{NetId, VertexId};
use anyhow::{Context, Result, anyhow, bail};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};

/// Reads a `.nets` file against an already loaded fabric.
///
/// ```text
/// DESIGN <name>
/// NET <name> [WIRE|CLOCK|STATIC]
///   SOURCE <pin> <vertex>
///   ALTSOURCE <pin> <vertex>
///   SINK <pin> <vertex> [ROUTED]
///   ROUTE <from> <to>
/// END
/// ```
pub fn parse(filename: &str, fabric: &FabricGraph) -> Result<Design> {
    let file = File::open(filename).with_context(|| format!("opening {}", filename))?;
    parse_reader(BufReader::new(file), fabric)
}

pub fn parse_str(text: &str, fabric: &FabricGraph) -> Result<Design> {
    parse_reader(text.as_bytes(), fabric)
}

fn parse_reader<R: BufRead>(reader: R, fabric: &FabricGraph) -> Result<Design> {
    let mut design = Design::new("top");
    let mut current: Option<NetId> = None;

    let lookup = |name: &str, at: usize| -> Result<VertexId> {
        fabric
            .vertex_by_name(name)
            .ok_or_else(|| anyhow!("line {}: unknown vertex '{}'", at, name))
    };

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() || parts[0].starts_with('#') {
            continue;
        }
        let at = line_no + 1;

        match parts[0] {
            "DESIGN" => {
                if let Some(name) = parts.get(1) {
                    design.name = name.to_string();
                }
            }
            "NET" => {
                if current.is_some() {
                    bail!("line {}: NET inside another NET (missing END)", at);
                }
                let name = parts
                    .get(1)
                    .ok_or_else(|| anyhow!("line {}: NET needs a name", at))?;
                let kind = match parts.get(2).copied() {
                    None | Some("WIRE") => NetKind::Wire,
                    Some("CLOCK") => NetKind::Clock,
                    Some("STATIC") => NetKind::Static,
                    Some(other) => bail!("line {}: unknown net kind '{}'", at, other),
                };
                if design.net_name_map.contains_key(*name) {
                    bail!("line {}: duplicate net '{}'", at, name);
                }
                current = Some(design.add_net(*name, kind));
            }
            "SOURCE" | "ALTSOURCE" | "SINK" => {
                let net = current.ok_or_else(|| anyhow!("line {}: pin outside NET", at))?;
                if parts.len() < 3 {
                    bail!("line {}: {} needs <pin> <vertex>", at, parts[0]);
                }
                let vertex = lookup(parts[2], at)?;
                let is_output = parts[0] != "SINK";
                if parts[0] == "SOURCE" && design.nets[net.index()].source.is_some() {
                    bail!("line {}: net has two SOURCE pins", at);
                }
                if parts[0] == "ALTSOURCE" && design.nets[net.index()].source.is_none() {
                    bail!("line {}: ALTSOURCE before SOURCE", at);
                }
                let pin = design.add_pin(net, parts[1], vertex, is_output);
                if parts.get(3) == Some(&"ROUTED") {
                    design.pins[pin.index()].routed = true;
                }
            }
            "ROUTE" => {
                let net = current.ok_or_else(|| anyhow!("line {}: ROUTE outside NET", at))?;
                if parts.len() < 3 {
                    bail!("line {}: ROUTE needs <from> <to>", at);
                }
                let edge = (lookup(parts[1], at)?, lookup(parts[2], at)?);
                design.nets[net.index()].edges.push(edge);
            }
            "END" => {
                if current.take().is_none() {
                    bail!("line {}: END without NET", at);
                }
            }
            other => bail!("line {}: unknown record '{}'", at, other),
        }
    }

    if current.is_some() {
        bail!("unterminated NET at end of file");
    }
    Ok(design)
}

pub fn write(design: &Design, fabric: &FabricGraph, filename: &str) -> Result<()> {
    let mut file = File::create(filename).with_context(|| format!("creating {}", filename))?;
    write_to(design, fabric, &mut file)?;
    Ok(())
}

pub fn write_to<W: Write>(design: &Design, fabric: &FabricGraph, out: &mut W) -> std::io::Result<()> {
    use crate::db::device::Device;

    writeln!(out, "DESIGN {}", design.name)?;
    for net in &design.nets {
        writeln!(out, "NET {} {}", net.name, net.kind.as_str())?;
        if let Some(src) = net.source {
            let pin = design.pin(src);
            writeln!(out, "  SOURCE {} {}", pin.name, fabric.vertex_name(pin.vertex))?;
        }
        if let Some(alt) = net.alt_source {
            let pin = design.pin(alt);
            writeln!(out, "  ALTSOURCE {} {}", pin.name, fabric.vertex_name(pin.vertex))?;
        }
        for &sink in &net.sinks {
            let pin = design.pin(sink);
            let flag = if pin.routed { " ROUTED" } else { "" };
            writeln!(
                out,
                "  SINK {} {}{}",
                pin.name,
                fabric.vertex_name(pin.vertex),
                flag
            )?;
        }
        for &(from, to) in &net.edges {
            writeln!(
                out,
                "  ROUTE {} {}",
                fabric.vertex_name(from),
                fabric.vertex_name(to)
            )?;
        }
        writeln!(out, "END")?;
    }
    Ok(())
}
