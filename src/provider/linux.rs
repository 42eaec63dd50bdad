// Linux-specific helpers: interface link speed from sysfs.

/// Fallback capacity when no interface reports a link speed: 1 Gbps in KB/s.
pub(super) const DEFAULT_LINK_KBPS: f64 = 125_000.0;

/// Link speed of `interface_name` in KB/s (Mbps * 125), read from
/// /sys/class/net/<interface>/speed. None if unavailable or not Linux.
pub(super) fn interface_speed_kbps(interface_name: &str) -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        let path = format!("/sys/class/net/{}/speed", interface_name);
        if let Ok(content) = std::fs::read_to_string(&path)
            && let Ok(mbps) = content.trim().parse::<i64>()
            && mbps > 0
        {
            return Some(mbps as f64 * 125.0);
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = interface_name;
    None
}

/// Capacity used for the network percentage: the fastest known link, else 1 Gbps.
pub(super) fn max_link_kbps<'a>(interfaces: impl IntoIterator<Item = &'a str>) -> f64 {
    interfaces
        .into_iter()
        .filter_map(interface_speed_kbps)
        .fold(None, |max: Option<f64>, s| Some(max.map_or(s, |m| m.max(s))))
        .unwrap_or(DEFAULT_LINK_KBPS)
}
