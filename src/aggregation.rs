// Pure aggregation logic shared by the flusher (batch averaging) and the query engine
// (time buckets and top-N rankings). No I/O here.

use std::collections::{BTreeMap, HashMap};

use crate::models::{
    Bucket, MachineRank, MachineRankings, Metric, ProcessRank, ProcessRankings, ProcessSample,
    Readings, ReadingsAccumulator, Sample,
};

/// Width of a lab series bucket.
pub const LAB_BUCKET_WIDTH_MS: i64 = 10_000;

/// Entries kept per ranking.
pub const TOP_N: usize = 3;

/// Start of the epoch-aligned window containing `timestamp_ms`.
pub fn bucket_start(timestamp_ms: i64, width_ms: i64) -> i64 {
    timestamp_ms.div_euclid(width_ms) * width_ms
}

/// Groups Metrics into fixed-width windows and averages each field. Ascending by bucket start.
pub fn bucket_metrics(metrics: &[Metric], width_ms: i64) -> Vec<Bucket> {
    if width_ms <= 0 {
        return Vec::new();
    }
    let mut by_bucket: BTreeMap<i64, ReadingsAccumulator> = BTreeMap::new();
    for m in metrics {
        by_bucket
            .entry(bucket_start(m.timestamp, width_ms))
            .or_default()
            .add(&m.readings);
    }
    by_bucket
        .into_iter()
        .map(|(timestamp, acc)| Bucket {
            timestamp,
            count: acc.count(),
            readings: acc.mean(),
        })
        .collect()
}

/// Averages a drained batch into one Metric stamped with `timestamp_ms`.
/// Uptime comes from the latest sample; processes are merged by identity.
pub fn average_samples(
    samples: &[Sample],
    machine_id: &str,
    lab_id: &str,
    timestamp_ms: i64,
) -> Option<Metric> {
    let last = samples.last()?;
    Some(Metric {
        machine_id: machine_id.to_string(),
        lab_id: lab_id.to_string(),
        timestamp: timestamp_ms,
        sample_count: samples.len() as u64,
        readings: Readings::mean(samples.iter().map(|s| &s.readings)),
        uptime_seconds: last.uptime_seconds,
        processes: merge_processes(samples.iter().map(|s| s.processes.as_slice())),
    })
}

/// Collapses process lists into one entry per identity, in first-seen order.
pub fn merge_processes<'a, I>(lists: I) -> Vec<ProcessSample>
where
    I: IntoIterator<Item = &'a [ProcessSample]>,
{
    group_processes(lists)
        .into_iter()
        .map(|acc| ProcessSample {
            pid: acc.pid,
            name: acc.name,
            command: acc.command,
            cpu: mean(acc.cpu_sum, acc.count),
            mem: mean(acc.mem_sum, acc.count),
            net_kbps: (acc.net_count > 0).then(|| mean(acc.net_sum, acc.net_count)),
            disk_kbps: (acc.disk_count > 0).then(|| mean(acc.disk_sum, acc.disk_count)),
        })
        .collect()
}

/// Top processes by mean cpu/mem/net/disk across the embedded process lists.
pub fn rank_processes(metrics: &[Metric]) -> ProcessRankings {
    let ranks: Vec<ProcessRank> = group_processes(metrics.iter().map(|m| m.processes.as_slice()))
        .into_iter()
        .map(|acc| ProcessRank {
            name: acc.name,
            avg_cpu: mean(acc.cpu_sum, acc.count),
            avg_mem: mean(acc.mem_sum, acc.count),
            avg_net: mean(acc.net_sum, acc.net_count),
            avg_disk_kbps: mean(acc.disk_sum, acc.disk_count),
            samples: acc.count,
        })
        .collect();

    // A field nobody instruments would rank as all zeros; emit nothing instead.
    let top_by_net = if ranks.iter().any(|p| p.avg_net > 0.0) {
        top_by(&ranks, |p| p.avg_net)
    } else {
        Vec::new()
    };
    let top_by_disk = if ranks.iter().any(|p| p.avg_disk_kbps > 0.0) {
        top_by(&ranks, |p| p.avg_disk_kbps)
    } else {
        Vec::new()
    };

    ProcessRankings {
        top_by_cpu: top_by(&ranks, |p| p.avg_cpu),
        top_by_mem: top_by(&ranks, |p| p.avg_mem),
        top_by_net,
        top_by_disk,
    }
}

/// Top machines by their mean disk %, net KB/s, cpu % and mem %.
pub fn rank_machines(metrics: &[Metric]) -> MachineRankings {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, ReadingsAccumulator)> = Vec::new();
    for m in metrics {
        let i = *index.entry(m.machine_id.as_str()).or_insert_with(|| {
            groups.push((m.machine_id.as_str(), ReadingsAccumulator::default()));
            groups.len() - 1
        });
        groups[i].1.add(&m.readings);
    }

    let ranks: Vec<MachineRank> = groups
        .into_iter()
        .map(|(machine_id, acc)| {
            let r = acc.mean();
            MachineRank {
                machine_id: machine_id.to_string(),
                avg_cpu_load_percent: r.cpu_load_percent,
                avg_mem_used_percent: r.mem_used_percent,
                avg_disk_used_percent: r.disk_used_percent,
                avg_net_kbps: r.net_kbps,
                samples: acc.count(),
            }
        })
        .collect();

    MachineRankings {
        top_pcs_by_disk: top_by(&ranks, |m| m.avg_disk_used_percent),
        top_pcs_by_net: top_by(&ranks, |m| m.avg_net_kbps),
        top_pcs_by_cpu: top_by(&ranks, |m| m.avg_cpu_load_percent),
        top_pcs_by_mem: top_by(&ranks, |m| m.avg_mem_used_percent),
    }
}

/// Descending by `key`, stable (ties keep encounter order), first TOP_N.
fn top_by<T: Clone>(items: &[T], key: impl Fn(&T) -> f64) -> Vec<T> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| key(b).total_cmp(&key(a)));
    sorted.truncate(TOP_N);
    sorted
}

struct ProcessAcc {
    pid: Option<u32>,
    name: String,
    command: Option<String>,
    cpu_sum: f64,
    mem_sum: f64,
    count: u64,
    net_sum: f64,
    net_count: u64,
    disk_sum: f64,
    disk_count: u64,
}

fn group_processes<'a, I>(lists: I) -> Vec<ProcessAcc>
where
    I: IntoIterator<Item = &'a [ProcessSample]>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ProcessAcc> = Vec::new();
    for list in lists {
        for p in list {
            let identity = p.identity();
            let i = match index.get(&identity) {
                Some(&i) => i,
                None => {
                    out.push(ProcessAcc {
                        pid: p.pid,
                        name: identity.clone(),
                        command: p.command.clone(),
                        cpu_sum: 0.0,
                        mem_sum: 0.0,
                        count: 0,
                        net_sum: 0.0,
                        net_count: 0,
                        disk_sum: 0.0,
                        disk_count: 0,
                    });
                    index.insert(identity, out.len() - 1);
                    out.len() - 1
                }
            };
            let acc = &mut out[i];
            acc.cpu_sum += p.cpu;
            acc.mem_sum += p.mem;
            acc.count += 1;
            if let Some(net) = p.net_kbps {
                acc.net_sum += net;
                acc.net_count += 1;
            }
            if let Some(disk) = p.disk_kbps {
                acc.disk_sum += disk;
                acc.disk_count += 1;
            }
        }
    }
    out
}

fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    sum / (count as f64)
}
