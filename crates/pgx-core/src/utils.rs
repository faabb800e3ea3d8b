//! 通用工具函数

/// 规范化药物标识：去除空白并转为大写，空串返回 None
pub fn normalize_drug_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_uppercase())
    }
}

/// 逗号拼接标识列表（multipart 表单字段格式）
pub fn join_identifiers<S: AsRef<str>>(ids: &[S]) -> String {
    ids.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(",")
}

/// 去除空白，空串视为缺失
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// 四舍五入到一位小数
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
