//! Bidirectional conversion between framework class names and backend
//! type strings: `Billing::ChargeJob` ⇄ `billing.charge`.
//!
//! `decode` is a heuristic with no guaranteed inverse of `encode`: acronym
//! and casing boundaries are lossy. Dispatch treats the class name carried
//! in envelope metadata as authoritative and only falls back to `decode`
//! when the metadata is absent.

const JOB_SUFFIX: &str = "Job";
const NAMESPACE_SEPARATOR: &str = "::";

/// Convert a class name into a backend type string.
///
/// Strips one trailing `Job` suffix, turns namespace separators into `.`,
/// and snake_cases each segment with acronym-boundary handling
/// (`ABCDef` → `abc_def`, `fooBar` → `foo_bar`).
pub fn encode(class_name: &str) -> String {
    let trimmed = match class_name.strip_suffix(JOB_SUFFIX) {
        Some(rest) if !rest.is_empty() && !rest.ends_with(NAMESPACE_SEPARATOR) => rest,
        _ => class_name,
    };

    trimmed
        .split(NAMESPACE_SEPARATOR)
        .map(underscore)
        .collect::<Vec<_>>()
        .join(".")
}

/// Best-effort inverse of [`encode`]: rebuild a class name from a type
/// string, appending the `Job` suffix when not already present.
pub fn decode(type_string: &str) -> String {
    let name = type_string
        .split('.')
        .map(|segment| segment.split('_').map(capitalize).collect::<String>())
        .collect::<Vec<_>>()
        .join(NAMESPACE_SEPARATOR);

    if name.ends_with(JOB_SUFFIX) {
        name
    } else {
        format!("{name}{JOB_SUFFIX}")
    }
}

// A new word starts at lower→Upper and at the last capital of an acronym
// run followed by a lowercase letter.
fn underscore(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::with_capacity(segment.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let boundary = match i.checked_sub(1).map(|p| chars[p]) {
                Some(prev) if prev.is_lowercase() || prev.is_ascii_digit() => true,
                Some(prev) if prev.is_uppercase() => {
                    chars.get(i + 1).is_some_and(|next| next.is_lowercase())
                }
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

fn capitalize(piece: &str) -> String {
    let mut chars = piece.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
