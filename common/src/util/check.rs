use crate::db::core::{Design, NetKind};
use crate::db::indices::{NetId, VertexId};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Post-route verification: no vertex shared by two nets, and every sink of
/// a signal net reachable from its source through the emitted edges.
pub fn run(design: &Design) -> Result<(), String> {
    log::info!("Starting Route Verification...");

    let (shorts_result, opens_result) =
        rayon::join(|| check_shorts(design), || check_opens(design));

    let mut msgs = Vec::new();

    match shorts_result {
        Err(e) => {
            log::error!("\x1b[31mFAIL\x1b[0m: Shared Routing Resources Detected");
            log::error!("{}", e);
            msgs.push(e);
        }
        Ok(_) => log::info!("\x1b[32mPASS\x1b[0m: No vertex is used by two nets."),
    }

    match opens_result {
        Err(e) => {
            log::error!("\x1b[31mFAIL\x1b[0m: Open Net (Disconnected Sink) Detected");
            log::error!("{}", e);
            msgs.push(e);
        }
        Ok(_) => log::info!("\x1b[32mPASS\x1b[0m: All sinks are connected."),
    }

    if msgs.is_empty() {
        log::info!("\x1b[32mSUCCESS\x1b[0m: ROUTING IS LEGAL");
        Ok(())
    } else {
        log::error!(
            "\x1b[31mFAILURE\x1b[0m: ILLEGAL ROUTING ({} Errors)",
            msgs.len()
        );
        Err(msgs.join("; "))
    }
}

fn check_shorts(design: &Design) -> Result<(), String> {
    let mut uses: Vec<(VertexId, NetId)> = design
        .nets
        .par_iter()
        .enumerate()
        .flat_map(|(net_idx, net)| {
            let net_id = NetId::new(net_idx);
            let mut vertices: HashSet<VertexId> = HashSet::new();
            for &(a, b) in &net.edges {
                vertices.insert(a);
                vertices.insert(b);
            }
            vertices
                .into_iter()
                .map(|v| (v, net_id))
                .collect::<Vec<_>>()
        })
        .collect();

    uses.par_sort_unstable();

    for pair in uses.windows(2) {
        if pair[0].0 == pair[1].0 && pair[0].1 != pair[1].1 {
            return Err(format!(
                "SHORT: '{}' vs '{}' on {:?}",
                design.nets[pair[0].1.index()].name,
                design.nets[pair[1].1.index()].name,
                pair[0].0
            ));
        }
    }
    Ok(())
}

fn check_opens(design: &Design) -> Result<(), String> {
    let error_found = AtomicBool::new(false);
    let error_msg = Mutex::new(String::new());

    let report = |msg: String| {
        if !error_found.swap(true, Ordering::Relaxed) {
            if let Ok(mut slot) = error_msg.lock() {
                *slot = msg;
            }
        }
    };

    design.nets.par_iter().for_each(|net| {
        if error_found.load(Ordering::Relaxed) {
            return;
        }
        if net.kind != NetKind::Wire || net.sinks.is_empty() {
            return;
        }
        let Some(source) = net.source else {
            report(format!("Net '{}': sinks without a source", net.name));
            return;
        };
        if net.edges.is_empty() {
            report(format!("Net '{}': Unrouted (No edges)", net.name));
            return;
        }

        let mut adj: HashMap<VertexId, Vec<VertexId>> = HashMap::new();
        for &(a, b) in &net.edges {
            adj.entry(a).or_default().push(b);
        }

        // sinks may hang off either source pin
        let starts = std::iter::once(source).chain(net.alt_source);
        let mut visited: HashSet<VertexId> = starts.map(|p| design.pin(p).vertex).collect();
        let mut queue: VecDeque<VertexId> = visited.iter().copied().collect();
        while let Some(u) = queue.pop_front() {
            if let Some(next) = adj.get(&u) {
                for &v in next {
                    if visited.insert(v) {
                        queue.push_back(v);
                    }
                }
            }
        }

        for &sink in &net.sinks {
            let pin = design.pin(sink);
            if !visited.contains(&pin.vertex) {
                report(format!(
                    "Net '{}': sink '{}' not reachable from source",
                    net.name, pin.name
                ));
                return;
            }
        }
    });

    if error_found.load(Ordering::Relaxed) {
        Err(error_msg
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    } else {
        Ok(())
    }
}
