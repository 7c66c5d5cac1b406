//! Compile-time scanning of display-name templates.
//!
//! Accepts the same grammar as `report_core::title::render`, so a template that passes
//! here never fails to render at run time.

/// A replacement field after automatic numbering has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Index(usize),
    Name(String),
}

/// Returns the fields referenced by `template`, in order of appearance.
pub fn scan(template: &str) -> Result<Vec<Field>, String> {
    let mut fields = Vec::new();
    let mut automatic: Option<usize> = None;
    let mut manual = false;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err("unmatched '{'".into()),
                    }
                }

                if field.contains([':', '!', '.', '[']) {
                    return Err(format!(
                        "only plain argument fields are supported, got {{{field}}}"
                    ));
                }

                if field.is_empty() {
                    if manual {
                        return Err("cannot switch from manual to automatic field numbering".into());
                    }
                    let index = automatic.map_or(0, |n| n + 1);
                    automatic = Some(index);
                    fields.push(Field::Index(index));
                } else if let Ok(index) = field.parse::<usize>() {
                    if automatic.is_some() {
                        return Err("cannot switch from automatic to manual field numbering".into());
                    }
                    manual = true;
                    fields.push(Field::Index(index));
                } else {
                    fields.push(Field::Name(field));
                }
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
            }
            '}' => return Err("single '}' encountered".into()),
            _ => {}
        }
    }

    Ok(fields)
}
