use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const KBIT: u64 = 1024;
const MBIT: u64 = 1024 * KBIT;
const GBIT: u64 = 1024 * MBIT;
const TBIT: u64 = 1024 * GBIT;
const PBIT: u64 = 1024 * TBIT;

/// 把 bits/s 格式化为人类可读的字符串 (1024 进制, 同时给出 bytes/s)
pub fn human_speed(bps: u64) -> String {
    let units = [
        (TBIT, "Tbit/s", "TBytes/s"),
        (GBIT, "Gbit/s", "GBytes/s"),
        (MBIT, "Mbit/s", "MBytes/s"),
        (KBIT, "Kbit/s", "KBytes/s"),
    ];

    if bps > PBIT {
        return "Too fast to test".to_string();
    }
    for (unit, bits_label, bytes_label) in units {
        if bps > unit {
            let bits = bps as f64 / unit as f64;
            return format!("{:.2} {} {:.2} {}", bits, bits_label, bits / 8.0, bytes_label);
        }
    }
    format!("{} bps", bps)
}

pub fn human_latency(d: Duration) -> String {
    format!("{:.2}ms", d.as_secs_f64() * 1000.0)
}

const SPARK_BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// 延迟样本的迷你折线图, 按 min..max 线性映射到 8 级方块
pub fn sparkline(samples: &[Duration]) -> String {
    let (Some(min), Some(max)) = (samples.iter().min(), samples.iter().max()) else {
        return String::new();
    };
    let span = (*max - *min).as_nanos();
    samples
        .iter()
        .map(|s| {
            if span == 0 {
                return SPARK_BARS[0];
            }
            let idx = (*s - *min).as_nanos() * (SPARK_BARS.len() as u128 - 1) / span;
            SPARK_BARS[idx as usize]
        })
        .collect()
}

/// 候选服务器测速进度条
pub fn probe_progress(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("|| "));
    }
    pb.set_message("Testing...");
    pb
}
