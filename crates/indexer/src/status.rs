use scour_protocol::{AggregateProgress, RootStatus};

/// Workspace-wide progress. When every initialized root has a known
/// total the counts are summed into one percentage; otherwise whatever
/// per-root percentages exist are averaged; with neither, the honest
/// answer is unknown.
#[must_use]
pub fn aggregate_progress(roots: &[RootStatus]) -> AggregateProgress {
    let initialized: Vec<&RootStatus> = roots.iter().filter(|r| r.initialized).collect();
    if initialized.is_empty() {
        return AggregateProgress::Unknown;
    }

    let all_counted = initialized
        .iter()
        .all(|r| r.progress.known && r.progress.total.is_some());
    if all_counted {
        let mut indexed = 0u64;
        let mut total = 0u64;
        for root in &initialized {
            let root_total = root.progress.total.unwrap_or(0);
            indexed += root.progress.indexed.unwrap_or(root_total).min(root_total);
            total += root_total;
        }
        let remaining = total.saturating_sub(indexed);
        let percent = if total == 0 {
            100
        } else {
            ((indexed * 100) / total) as u8
        };
        return AggregateProgress::Counted {
            indexed,
            total,
            remaining,
            percent,
        };
    }

    let percents: Vec<u64> = initialized
        .iter()
        .filter_map(|r| r.progress.percent.map(u64::from))
        .collect();
    if percents.is_empty() {
        return AggregateProgress::Unknown;
    }
    let average = percents.iter().sum::<u64>() / percents.len() as u64;
    AggregateProgress::Averaged {
        percent: average as u8,
    }
}
