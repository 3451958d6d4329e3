//! Identity keys for recognising the same business across sources.
//!
//! A key is `normalize_name(name) + "-" + normalize_location(location)`.
//! Normalisation folds full-width ASCII, lowercases, strips legal-entity
//! markers from names and administrative-division suffixes from locations,
//! and collapses whitespace. This is a best-effort heuristic: two spellings
//! of one company should collide, but distinct companies sharing a stem
//! may collide too.

use crate::types::CandidateRecord;

/// Legal-entity markers that may appear anywhere in a Japanese name.
const ENTITY_MARKERS: &[&str] = &[
    "特定非営利活動法人",
    "一般社団法人",
    "一般財団法人",
    "公益社団法人",
    "公益財団法人",
    "社会福祉法人",
    "独立行政法人",
    "株式会社",
    "有限会社",
    "合同会社",
    "合資会社",
    "合名会社",
    "医療法人",
    "学校法人",
    "財団法人",
    "社団法人",
    "npo法人",
    "(株)",
    "(有)",
    "(同)",
    "㈱",
    "㈲",
];

/// Latin legal-entity suffixes, longest first. Matched only at the end of
/// the name and only on a word boundary.
const ENTITY_SUFFIXES: &[&str] = &[
    "incorporated",
    "corporation",
    "foundation",
    "co., ltd.",
    "co.,ltd.",
    "co., ltd",
    "co.,ltd",
    "co. ltd.",
    "co ltd",
    "limited",
    "l.l.c.",
    "corp.",
    "corp",
    "inc.",
    "inc",
    "llc",
    "ltd.",
    "ltd",
    "k.k.",
    "g.k.",
    "kk",
    "gk",
];

/// Romanised administrative-division suffixes.
const DIVISION_SUFFIXES: &[&str] = &[
    " prefecture",
    " village",
    " pref.",
    " city",
    " ward",
    " town",
    "-machi",
    "-mura",
    "-ken",
    "-shi",
    "-cho",
    "-to",
    "-fu",
    "-ku",
];

/// Single-character Japanese division suffixes.
const DIVISION_CHARS: &[char] = &['都', '道', '府', '県', '市', '区', '町', '村'];

/// The 47 prefectures, used to reduce a full address-like location to its
/// prefecture stem.
const PREFECTURES: &[&str] = &[
    "北海道", "青森県", "岩手県", "宮城県", "秋田県", "山形県", "福島県", "茨城県", "栃木県",
    "群馬県", "埼玉県", "千葉県", "東京都", "神奈川県", "新潟県", "富山県", "石川県", "福井県",
    "山梨県", "長野県", "岐阜県", "静岡県", "愛知県", "三重県", "滋賀県", "京都府", "大阪府",
    "兵庫県", "奈良県", "和歌山県", "鳥取県", "島根県", "岡山県", "広島県", "山口県", "徳島県",
    "香川県", "愛媛県", "高知県", "福岡県", "佐賀県", "長崎県", "熊本県", "大分県", "宮崎県",
    "鹿児島県", "沖縄県",
];

/// Derived key deciding whether two records describe the same business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Compute the key from a raw name and location.
    pub fn from_parts(name: &str, location: Option<&str>) -> Self {
        Self(format!(
            "{}-{}",
            normalize_name(name),
            normalize_location(location.unwrap_or(""))
        ))
    }

    /// Compute the key of a record.
    pub fn of(record: &CandidateRecord) -> Self {
        Self::from_parts(&record.name, record.location.as_deref())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalise a business name for identity comparison.
pub fn normalize_name(name: &str) -> String {
    let mut s = fold_width(name).to_lowercase();
    for marker in ENTITY_MARKERS {
        s = s.replace(marker, " ");
    }
    let mut s = collapse_whitespace(&s);

    loop {
        let trimmed = s.trim_end_matches([',', ' ']).to_string();
        let stripped = ENTITY_SUFFIXES
            .iter()
            .find_map(|suffix| strip_word_suffix(&trimmed, suffix));
        match stripped {
            Some(rest) if !rest.is_empty() => s = rest,
            _ => {
                s = trimmed;
                break;
            }
        }
    }

    collapse_whitespace(s.trim_matches(|c: char| c == ',' || c == '.' || c.is_whitespace()))
}

/// Normalise a location for identity comparison.
pub fn normalize_location(location: &str) -> String {
    let s = collapse_whitespace(&fold_width(location).to_lowercase());
    if s.is_empty() {
        return s;
    }

    if let Some(prefecture) = PREFECTURES.iter().find(|p| s.starts_with(*p)) {
        return prefecture_stem(prefecture).to_string();
    }

    if let Some(rest) = DIVISION_SUFFIXES
        .iter()
        .find_map(|suffix| s.strip_suffix(suffix))
    {
        if !rest.trim().is_empty() {
            return rest.trim().to_string();
        }
    }

    let mut chars: Vec<char> = s.chars().collect();
    if chars.len() > 2 && chars.last().is_some_and(|c| DIVISION_CHARS.contains(c)) {
        chars.pop();
    }
    chars.into_iter().collect()
}

/// `東京都` → `東京`, `神奈川県` → `神奈川`. Hokkaido keeps its full name.
fn prefecture_stem(prefecture: &str) -> &str {
    if prefecture == "北海道" {
        return prefecture;
    }
    prefecture
        .char_indices()
        .last()
        .map(|(idx, _)| &prefecture[..idx])
        .unwrap_or(prefecture)
}

/// Remove `suffix` when it ends `s` on a word boundary.
fn strip_word_suffix(s: &str, suffix: &str) -> Option<String> {
    let rest = s.strip_suffix(suffix)?;
    if rest.is_empty() || rest.ends_with([' ', ',']) {
        Some(rest.trim_end_matches([',', ' ']).to_string())
    } else {
        None
    }
}

/// Map full-width ASCII variants and the ideographic space onto ASCII.
fn fold_width(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_suffix_and_romanised_division_collide() {
        let a = IdentityKey::from_parts("Example Inc.", Some("Tokyo-to"));
        let b = IdentityKey::from_parts("Example", Some("Tokyo"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "example-tokyo");
    }

    #[test]
    fn test_japanese_entity_markers() {
        assert_eq!(normalize_name("株式会社サンプル"), "サンプル");
        assert_eq!(normalize_name("サンプル株式会社"), "サンプル");
        assert_eq!(normalize_name("（株）サンプル"), "サンプル");
        assert_eq!(normalize_name("㈱サンプル"), "サンプル");
        assert_eq!(normalize_name("公益財団法人 サンプル記念"), "サンプル記念");
    }

    #[test]
    fn test_latin_suffix_variants() {
        assert_eq!(normalize_name("Acme Co., Ltd."), "acme");
        assert_eq!(normalize_name("ACME Corporation"), "acme");
        assert_eq!(normalize_name("Acme  Holdings  LLC"), "acme holdings");
        assert_eq!(normalize_name("Open Data Foundation"), "open data");
    }

    #[test]
    fn test_suffix_requires_word_boundary() {
        assert_eq!(normalize_name("Zinc"), "zinc");
        assert_eq!(normalize_name("Mink"), "mink");
    }

    #[test]
    fn test_name_that_is_only_a_suffix_is_kept() {
        assert_eq!(normalize_name("Inc"), "inc");
    }

    #[test]
    fn test_full_width_folding() {
        assert_eq!(normalize_name("ＡＢＣ　Ｉｎｃ．"), "abc");
    }

    #[test]
    fn test_prefecture_locations() {
        assert_eq!(normalize_location("東京都"), "東京");
        assert_eq!(normalize_location("東京都渋谷区神南1-2-3"), "東京");
        assert_eq!(normalize_location("京都府"), "京都");
        assert_eq!(normalize_location("北海道札幌市"), "北海道");
        assert_eq!(normalize_location("神奈川県"), "神奈川");
    }

    #[test]
    fn test_generic_division_suffix() {
        assert_eq!(normalize_location("横浜市"), "横浜");
        assert_eq!(normalize_location("Osaka-fu"), "osaka");
        assert_eq!(normalize_location("Kanagawa Prefecture"), "kanagawa");
        assert_eq!(normalize_location("Shibuya-ku"), "shibuya");
    }

    #[test]
    fn test_two_char_location_keeps_suffix_char() {
        assert_eq!(normalize_location("京都"), "京都");
    }

    #[test]
    fn test_missing_location() {
        let key = IdentityKey::from_parts("Acme", None);
        assert_eq!(key.as_str(), "acme-");
    }
}
