use crate::error::FailureKind;

#[derive(Debug, Clone, Copy)]
pub struct WarnEvent<'a> {
    pub kind: FailureKind,
    pub stage: &'a str,
    pub box_id: &'a str,
    pub record: &'a str,
    pub path: &'a str,
    pub reason: &'a str,
    pub err: &'a str,
}

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

fn render(event: &WarnEvent<'_>) -> String {
    format!(
        "DIGITIZE_WARN code={} stage={} box={} record={} path={} reason={} err={}",
        event.kind.as_str(),
        sanitize_value(event.stage),
        sanitize_value(event.box_id),
        sanitize_value(event.record),
        sanitize_value(event.path),
        sanitize_value(event.reason),
        sanitize_value(event.err),
    )
}

pub fn emit(event: WarnEvent<'_>) {
    eprintln!("{}", render(&event));
}

#[cfg(test)]
mod tests {
    use super::{WarnEvent, render, sanitize_value};
    use crate::error::FailureKind;

    #[test]
    fn sanitize_value_rewrites_whitespace() {
        assert_eq!(sanitize_value("a b\tc"), "a_b_c");
    }

    #[test]
    fn sanitize_value_falls_back_for_empty() {
        assert_eq!(sanitize_value("   "), "na");
    }

    #[test]
    fn rendered_line_is_single_token_per_field() {
        let line = render(&WarnEvent {
            kind: FailureKind::StorageQueryFailure,
            stage: "locate",
            box_id: "B_001",
            record: "REC 2",
            path: "raw/TIFF/B_001/REC 2/",
            reason: "list-failed",
            err: "",
        });
        assert_eq!(
            line,
            "DIGITIZE_WARN code=E102_STORAGE_QUERY_FAILURE stage=locate box=B_001 record=REC_2 path=raw/TIFF/B_001/REC_2/ reason=list-failed err=na"
        );
    }
}
