//! Progress arithmetic and byte formatting.

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

/// `processed / total` as a percentage in `[0, 100]`; `0` when `total == 0`.
pub fn percentage(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = processed as f64 / total as f64 * 100.0;
    pct.clamp(0.0, 100.0)
}

/// Base-1024 human size: `512 B`, `2.0 KB`, `1.5 MB`, `3.2 GB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else if bytes < GIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    }
}
