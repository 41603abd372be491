//! 根据 User-Agent 粗略识别设备属性。属性只用于展示；
//! 规范化后的 User-Agent 本身参与设备 ID 推导。

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub device_name: String,
    pub os: String,
    pub browser: String,
    pub device_type: String,
}

const UNKNOWN: &str = "Unknown";

/// 登录与鉴权共用：缺失或空白的 User-Agent 一律按 "Unknown" 处理
pub fn effective_user_agent(raw: Option<&str>) -> &str {
    raw.map(str::trim)
        .filter(|ua| !ua.is_empty())
        .unwrap_or(UNKNOWN)
}

pub fn classify_user_agent(user_agent: &str) -> DeviceProfile {
    let ua = user_agent.to_ascii_lowercase();

    let os = if ua.contains("android") {
        "Android"
    } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
        "iOS"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("mac os x") || ua.contains("macintosh") {
        "Mac OS X"
    } else if ua.contains("cros") {
        "Chrome OS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "Other"
    };

    // 顺序敏感：Edge/Opera 的 UA 同时包含 Chrome，Chrome 的 UA 同时包含 Safari
    let browser = if ua.contains("edg/") || ua.contains("edge/") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("firefox/") {
        "Firefox"
    } else if ua.contains("chrome/") || ua.contains("crios/") {
        "Chrome"
    } else if ua.contains("safari/") {
        "Safari"
    } else {
        "Other"
    };

    let is_tablet = ua.contains("ipad") || (ua.contains("android") && !ua.contains("mobile"));
    let is_mobile = !is_tablet
        && (ua.contains("mobile") || ua.contains("iphone") || ua.contains("ipod"));
    let is_pc = !is_tablet
        && !is_mobile
        && matches!(os, "Windows" | "Mac OS X" | "Linux" | "Chrome OS");

    let device_type = if is_mobile {
        "Mobile"
    } else if is_tablet {
        "Tablet"
    } else if is_pc {
        "PC"
    } else {
        UNKNOWN
    };

    let device_name = if ua.contains("iphone") {
        "Apple iPhone"
    } else if ua.contains("ipad") {
        "Apple iPad"
    } else if ua.contains("macintosh") {
        "Apple Mac"
    } else {
        "Unknown Device"
    };

    DeviceProfile {
        device_name: device_name.into(),
        os: os.into(),
        browser: browser.into(),
        device_type: device_type.into(),
    }
}
