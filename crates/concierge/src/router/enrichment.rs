//! Heuristics for the remote path: product tags mined from the generated
//! text, and quick-action suggestions keyed on the user's own message.

/// (triggers found in generated text, tags to look up)
const TAG_RULES: &[(&[&str], &[&str])] = &[
    (&["thạch anh tím", "amethyst"], &["amethyst", "thạch anh tím"]),
    (&["thạch anh vàng", "citrine"], &["citrine", "thạch anh vàng"]),
    (&["thạch anh hồng", "rose quartz"], &["rose quartz", "thạch anh hồng"]),
    (&["thạch anh trắng", "clear quartz"], &["clear quartz", "thạch anh trắng"]),
    (&["obsidian", "hắc diện thạch"], &["obsidian"]),
    (&["tier", "bundle"], &["tier", "bundle"]),
    (&["course", "khóa học", "khoá học"], &["course"]),
];

/// (triggers found in the user message, suggestions)
const QUICK_ACTION_RULES: &[(&[&str], [&str; 3])] = &[
    (
        &["giá", "bao nhiêu", "mua", "price", "buy"],
        ["Xem bảng giá", "Sản phẩm bán chạy", "Hướng dẫn đặt hàng"],
    ),
    (
        &["khóa học", "khoá học", "course", "trading", "tier"],
        ["Xem các tier", "So sánh khóa học", "Đăng ký học thử"],
    ),
    (
        &["đá", "crystal", "thạch anh", "phong thủy"],
        ["Xem đá phong thủy", "Chọn đá theo mệnh", "Cách làm sạch đá"],
    ),
    (
        &["ship", "giao hàng", "đổi trả", "bảo hành"],
        ["Phí vận chuyển", "Chính sách đổi trả", "Liên hệ hỗ trợ"],
    ),
];

const FALLBACK_QUICK_ACTIONS: [&str; 3] = ["Xem sản phẩm", "Tư vấn chọn đá", "Liên hệ shop"];

/// Candidate tags for the products mentioned in `text`, de-duplicated in
/// first-seen order.
pub fn extract_tags(text: &str) -> Vec<String> {
    let text = text.to_lowercase();
    let mut tags: Vec<String> = Vec::new();
    for (triggers, rule_tags) in TAG_RULES {
        if triggers.iter().any(|t| text.contains(t)) {
            for tag in rule_tags.iter() {
                if !tags.iter().any(|existing| existing == tag) {
                    tags.push(tag.to_string());
                }
            }
        }
    }
    tags
}

/// Three follow-up suggestions for `message`; the first matching rule wins.
pub fn quick_actions_for(message: &str) -> Vec<String> {
    let message = message.to_lowercase();
    let actions = QUICK_ACTION_RULES
        .iter()
        .find(|(triggers, _)| triggers.iter().any(|t| message.contains(t)))
        .map(|(_, actions)| actions)
        .unwrap_or(&FALLBACK_QUICK_ACTIONS);
    actions.iter().map(|a| a.to_string()).collect()
}
