// ==========================================
// 档案批量导入引擎 - 土地编号解析器
// ==========================================
// 输入: 单个单元格（可多行）
// 输出: 去重后的土地标识列表（保持首次出现顺序）
// 语法（按行，优先级从高到低）:
// 1. "(n1+n2،n3) M نموذج" → "نموذج M (n1)", "نموذج M (n2)", ...
// 2. "نموذج A-B" / "A-B نموذج" → "نموذج A" ... "نموذج B"
// 3. "نموذج N" / "N نموذج" → "نموذج N"
// 4. 其他 → 原样保留
// ==========================================

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const MODEL_WORD: &str = "نموذج";

static LINE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n]+").unwrap());
static PAREN_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]+)\)\s*([0-9]+)\s*نموذج").unwrap());
static SUB_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[+,،\s]+").unwrap());
static RANGE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"نموذج\s+([0-9]+)\s*[-–]\s*([0-9]+)").unwrap());
static RANGE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+)\s*[-–]\s*([0-9]+)\s+نموذج").unwrap());
static SINGLE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"نموذج\s+([0-9]+)").unwrap());
static SINGLE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)\s+نموذج").unwrap());

/// 解析土地编号单元格
///
/// # 参数
/// - raw: 单元格值（None / 空白 → 空列表）
/// - max_range: 范围展开上限，超过则整行原样保留
pub fn parse_land_numbers(raw: Option<&str>, max_range: u64) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let normalized = to_ascii_digits(raw);

    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for line in LINE_SPLIT.split(&normalized) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        for id in parse_line(line, max_range) {
            if seen.insert(id.clone()) {
                result.push(id);
            }
        }
    }

    result
}

fn parse_line(line: &str, max_range: u64) -> Vec<String> {
    if let Some(caps) = PAREN_LIST.captures(line) {
        let model = &caps[2];
        let subs: Vec<String> = SUB_SPLIT
            .split(&caps[1])
            .map(str::trim)
            .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            .map(|s| format!("{} {} ({})", MODEL_WORD, model, s))
            .collect();
        if !subs.is_empty() {
            return subs;
        }
    }

    let range = RANGE_PREFIX
        .captures(line)
        .or_else(|| RANGE_SUFFIX.captures(line));
    if let Some(caps) = range {
        if let (Ok(a), Ok(b)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) {
            // 反向范围交换
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            if end - start < max_range {
                return (start..=end)
                    .map(|i| format!("{} {}", MODEL_WORD, i))
                    .collect();
            }
            return vec![line.to_string()];
        }
    }

    let single = SINGLE_PREFIX
        .captures(line)
        .or_else(|| SINGLE_SUFFIX.captures(line));
    if let Some(caps) = single {
        if let Ok(n) = caps[1].parse::<u64>() {
            return vec![format!("{} {}", MODEL_WORD, n)];
        }
    }

    vec![line.to_string()]
}

/// 阿拉伯-印度数字 → ASCII 数字
fn to_ascii_digits(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            other => other,
        })
        .collect()
}
