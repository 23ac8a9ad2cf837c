//! C13: turns RP `RemoteObject`s into the short strings a UI actually
//! shows -- stack-frame/UI previews (tight budget) and REPL/console
//! output (roomier budget), plus the printf-style formatting
//! `console.log("%s is %d", name, age)` needs.
//!
//! No direct teacher analogue; grounded on the design notes' truncation
//! budgets and Node/V8's well-known `util.format` specifier set.

use crate::rp::runtime::{ObjectPreview, PropertyPreview, RemoteObject, RemoteObjectType};

/// Stack-frame and UI previews (hover tooltips, watch panes).
pub const COMPACT_PREVIEW_BUDGET: usize = 100;
/// REPL/console output.
pub const MESSAGE_PREVIEW_BUDGET: usize = 1000;

/// Renders a single value for a preview context, truncating at `budget`
/// characters and appending an ellipsis marker when truncated.
pub fn render_preview(object: &RemoteObject, budget: usize) -> String {
    let full = render_full(object);
    truncate(&full, budget)
}

fn render_full(object: &RemoteObject) -> String {
    if let Some(description) = &object.description {
        if let Some(preview) = &object.preview {
            return render_object_preview(description, preview);
        }
        return description.clone();
    }
    match &object.value {
        Some(value) => value.to_string(),
        None => object.type_.to_string(),
    }
}

fn render_object_preview(description: &str, preview: &ObjectPreview) -> String {
    let props: Vec<String> = preview
        .properties
        .iter()
        .map(render_property_preview)
        .collect();
    let body = props.join(", ");
    let suffix = if preview.overflow { ", ..." } else { "" };
    format!("{description} {{{body}{suffix}}}")
}

fn render_property_preview(prop: &PropertyPreview) -> String {
    match &prop.value {
        Some(value) => format!("{}: {}", prop.name, value),
        None => format!("{}: {}", prop.name, prop.type_),
    }
}

fn truncate(s: &str, budget: usize) -> String {
    if s.chars().count() <= budget {
        return s.to_string();
    }
    let mut out: String = s.chars().take(budget.saturating_sub(1)).collect();
    out.push('\u{2026}');
    out
}

/// Console-message formatting: if the first argument is a format string
/// containing `%`-specifiers, consumes following arguments positionally
/// (sequentially, or by an explicit `%N$` position) into `s`/`d`/`i`/`f`/
/// `c`/`o`/`O`, optionally narrowed by a `.N` precision. An unrecognised
/// specifier (or one missing its type letter) is emitted literally
/// together with whatever position/precision it carried, and consumes no
/// argument. Whatever arguments were never consumed by a specifier (or
/// every argument, if there was no format string) are appended
/// space-separated.
pub fn format_console_message(args: &[RemoteObject]) -> String {
    let Some(first) = args.first() else {
        return String::new();
    };
    let Some(format) = first.value.as_ref().and_then(|v| v.as_str()) else {
        return args.iter().map(|a| render_preview(a, MESSAGE_PREVIEW_BUDGET)).collect::<Vec<_>>().join(" ");
    };
    if !format.contains('%') {
        return args.iter().map(|a| render_preview(a, MESSAGE_PREVIEW_BUDGET)).collect::<Vec<_>>().join(" ");
    }

    let rest = &args[1..];
    let mut used = vec![false; rest.len()];
    let mut seq_cursor = 0usize;
    let chars: Vec<char> = format.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        if chars.get(i + 1) == Some(&'%') {
            out.push('%');
            i += 2;
            continue;
        }

        let mut j = i + 1;
        let digit_start = j;
        while j < chars.len() && chars[j].is_ascii_digit() {
            j += 1;
        }
        let position = if j > digit_start && chars.get(j) == Some(&'$') {
            let n: usize = chars[digit_start..j].iter().collect::<String>().parse().unwrap_or(0);
            j += 1;
            Some(n)
        } else {
            j = digit_start;
            None
        };

        let mut precision = None;
        if chars.get(j) == Some(&'.') {
            let precision_start = j + 1;
            let mut k = precision_start;
            while k < chars.len() && chars[k].is_ascii_digit() {
                k += 1;
            }
            if k > precision_start {
                precision = chars[precision_start..k].iter().collect::<String>().parse::<usize>().ok();
                j = k;
            }
        }

        match chars.get(j) {
            Some(&type_char @ ('s' | 'd' | 'i' | 'f' | 'c' | 'o' | 'O')) => {
                let arg_index = match position {
                    Some(n) if n >= 1 && n <= rest.len() => Some(n - 1),
                    Some(_) => None,
                    None if seq_cursor < rest.len() => {
                        let idx = seq_cursor;
                        seq_cursor += 1;
                        Some(idx)
                    }
                    None => None,
                };
                match arg_index {
                    Some(idx) => {
                        used[idx] = true;
                        out.push_str(&format_specifier(type_char, precision, &rest[idx]));
                    }
                    None => out.push_str(missing_arg_literal(type_char)),
                }
                i = j + 1;
            }
            spec => {
                // Unknown (or truncated) specifier: emitted verbatim,
                // precision and all, per the formatting contract. No
                // argument is consumed.
                let literal_end = if spec.is_some() { j + 1 } else { j };
                out.extend(&chars[i..literal_end]);
                i = literal_end;
            }
        }
    }

    for (idx, arg) in rest.iter().enumerate() {
        if !used[idx] {
            out.push(' ');
            out.push_str(&render_preview(arg, MESSAGE_PREVIEW_BUDGET));
        }
    }
    out
}

fn format_specifier(type_char: char, precision: Option<usize>, arg: &RemoteObject) -> String {
    match type_char {
        's' => {
            let rendered = render_preview(arg, MESSAGE_PREVIEW_BUDGET);
            match precision {
                Some(n) => rendered.chars().take(n).collect(),
                None => rendered,
            }
        }
        'd' | 'i' => match arg.value.as_ref().and_then(|v| v.as_f64()) {
            Some(n) => (n.trunc() as i64).to_string(),
            None => "NaN".to_string(),
        },
        'f' => match arg.value.as_ref().and_then(|v| v.as_f64()) {
            Some(n) => match precision {
                Some(p) => format!("{:.*}", p, n),
                None => n.to_string(),
            },
            None => "NaN".to_string(),
        },
        'c' => String::new(), // CSS styling argument: dropped, no ANSI terminal to target.
        'o' | 'O' => render_preview(arg, MESSAGE_PREVIEW_BUDGET),
        _ => unreachable!("only s/d/i/f/c/o/O reach here"),
    }
}

fn missing_arg_literal(type_char: char) -> &'static str {
    match type_char {
        's' => "%s",
        'd' | 'i' => "NaN",
        'f' => "NaN",
        'c' => "",
        'o' => "%o",
        'O' => "%O",
        _ => unreachable!("only s/d/i/f/c/o/O reach here"),
    }
}
