//! Text rendering for container diagnostics.
//!
//! Error messages and startup logs talk about binders, capabilities and
//! dependency chains. The helpers here turn those into short, readable text.

/// Separator used between the links of a dependency chain.
pub const CHAIN_ARROW: &str = " → ";

/// Renders a dependency chain on one line.
///
/// # Examples
/// ```
/// use rabt_support::rendering::render_chain;
///
/// let chain = ["OrderService", "PaymentGateway", "OrderService"];
/// assert_eq!(render_chain(&chain), "OrderService → PaymentGateway → OrderService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    let mut out = String::new();
    for (i, link) in chain.iter().enumerate() {
        if i > 0 {
            out.push_str(CHAIN_ARROW);
        }
        out.push_str(link.as_ref());
    }
    out
}

/// Strips module paths from every path segment of a type name.
///
/// Generic arguments and trait objects keep their shape, only the
/// leading `crate::module::` parts disappear.
///
/// ```
/// use rabt_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("shop::billing::Invoice"), "Invoice");
/// assert_eq!(shorten_type_name("dyn shop::ports::Mailer"), "dyn Mailer");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn shop::ports::Mailer>"),
///     "Arc<dyn Mailer>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut out = String::with_capacity(full_name.len());
    let mut token = String::new();
    let mut rest = full_name;

    while let Some(ch) = rest.chars().next() {
        if rest.starts_with("::") {
            token.clear();
            rest = &rest[2..];
            continue;
        }
        if matches!(ch, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';' | '+') {
            out.push_str(&token);
            out.push(ch);
            token.clear();
        } else {
            token.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }

    out.push_str(&token);
    out
}

/// Picks the registered names that look closest to `requested`.
///
/// Used for "did you mean" hints when a dependency cannot be resolved.
/// Candidates are ranked by containment first, then by the length of the
/// common prefix of their shortened names.
pub fn suggest_similar(requested: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let wanted = comparable(requested);
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<(usize, &str)> = available
        .iter()
        .filter_map(|&candidate| {
            let short = comparable(candidate);
            if short == wanted {
                return None;
            }
            if short.contains(&wanted) || wanted.contains(&short) {
                return Some((usize::MAX, candidate));
            }
            let prefix = short
                .chars()
                .zip(wanted.chars())
                .take_while(|(a, b)| a == b)
                .count();
            (prefix >= 3).then_some((prefix, candidate))
        })
        .collect();

    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    ranked.dedup_by(|a, b| a.1 == b.1);
    ranked
        .into_iter()
        .take(max_suggestions)
        .map(|(_, name)| name.to_string())
        .collect()
}

fn comparable(type_name: &str) -> String {
    let short = shorten_type_name(type_name).to_lowercase();
    if let Some(stripped) = short.strip_prefix("dyn ") {
        return stripped.to_string();
    }
    short
}

/// One line of a rendered startup plan.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    /// Startup stage the binder belongs to (`1` or `2`).
    pub stage: u8,
    /// Binder kind, e.g. `singleton`.
    pub kind: String,
    /// Implementation (or production) type.
    pub label: String,
    /// Bound name, if any.
    pub name: Option<String>,
}

/// Renders the start order of binders, one per line.
///
/// ```text
/// stage 1 │ interceptor  AuditTrail
/// stage 2 │ singleton    Database
///         │ prototype    ReportJob  (name: "nightly")
/// ```
pub fn render_plan(entries: &[PlanEntry]) -> String {
    let kind_width = entries.iter().map(|e| e.kind.len()).max().unwrap_or(0);
    let mut out = String::new();
    let mut last_stage = None;

    for entry in entries {
        if last_stage == Some(entry.stage) {
            out.push_str("        │ ");
        } else {
            out.push_str(&format!("stage {} │ ", entry.stage));
            last_stage = Some(entry.stage);
        }
        out.push_str(&format!("{:<width$}  {}", entry.kind, entry.label, width = kind_width));
        if let Some(name) = &entry.name {
            out.push_str(&format!("  (name: {name:?})"));
        }
        out.push('\n');
    }

    out
}
