//! Display-name templates.
//!
//! Templates use the replacement-field syntax of Python's `str.format`, limited to
//! argument substitution: `{}` (automatic numbering), `{0}` (by position), `{name}` (by
//! parameter name) and `{{`/`}}` escapes. Values are rendered with `Display` when the
//! arguments are collected, so rendering never needs the original values.
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
};

use crate::{Error, Result};

/// Rendered call arguments, addressable by position and by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    positional: BTreeMap<usize, String>,
    named: HashMap<String, String>,
}

impl Args {
    pub fn new() -> Args {
        Args::default()
    }

    /// Add a parameter reachable both as `{index}` and as `{name}`.
    pub fn arg(mut self, index: usize, name: &str, value: &dyn Display) -> Args {
        let value = value.to_string();
        self.named.insert(name.to_string(), value.clone());
        self.positional.insert(index, value);
        self
    }

    pub fn positional(mut self, index: usize, value: &dyn Display) -> Args {
        self.positional.insert(index, value.to_string());
        self
    }

    pub fn named(mut self, name: &str, value: &dyn Display) -> Args {
        self.named.insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Numbering {
    Unset,
    Automatic(usize),
    Manual,
}

/// Render `template` with `args`.
pub fn render(template: &str, args: &Args) -> Result<String> {
    let fail = |reason: String| Error::Title {
        template: template.to_string(),
        reason,
    };

    let mut out = String::with_capacity(template.len());
    let mut numbering = Numbering::Unset;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err(fail("unmatched '{'".into())),
                    }
                }

                if field.contains([':', '!', '.', '[']) {
                    return Err(fail(format!(
                        "only plain argument fields are supported, got {{{field}}}"
                    )));
                }

                let value = if field.is_empty() {
                    let index = match numbering {
                        Numbering::Manual => {
                            return Err(fail(
                                "cannot switch from manual to automatic field numbering".into(),
                            ))
                        }
                        Numbering::Unset => 0,
                        Numbering::Automatic(next) => next,
                    };
                    numbering = Numbering::Automatic(index + 1);
                    args.positional
                        .get(&index)
                        .ok_or_else(|| fail(format!("positional argument {index} is missing")))?
                } else if let Ok(index) = field.parse::<usize>() {
                    if let Numbering::Automatic(_) = numbering {
                        return Err(fail(
                            "cannot switch from automatic to manual field numbering".into(),
                        ));
                    }
                    numbering = Numbering::Manual;
                    args.positional
                        .get(&index)
                        .ok_or_else(|| fail(format!("positional argument {index} is missing")))?
                } else {
                    args.named
                        .get(&field)
                        .ok_or_else(|| fail(format!("argument \"{field}\" is missing")))?
                };
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(fail("single '}' encountered".into())),
            c => out.push(c),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    fn login_args() -> Args {
        Args::new().arg(0, "user", &"admin").arg(1, "attempts", &3)
    }

    #[test_case("Login as {0}" => "Login as admin"; "positional")]
    #[test_case("Login as {user}" => "Login as admin"; "named")]
    #[test_case("{} tries {}" => "admin tries 3"; "automatic numbering")]
    #[test_case("{1} x {0}" => "3 x admin"; "reordered")]
    #[test_case("{user} ({0})" => "admin (admin)"; "named and positional")]
    #[test_case("{{literal}} {0}" => "{literal} admin"; "escaped braces")]
    #[test_case("Open the cart" => "Open the cart"; "no fields")]
    fn render_template(template: &str) -> String {
        render(template, &login_args()).unwrap()
    }

    #[test_case("{} {0}"; "automatic then manual")]
    #[test_case("{0} {}"; "manual then automatic")]
    #[test_case("{2}"; "missing positional")]
    #[test_case("{password}"; "missing named")]
    #[test_case("{0"; "unmatched open brace")]
    #[test_case("0}"; "single close brace")]
    #[test_case("{0:>5}"; "format spec")]
    #[test_case("{0!r}"; "conversion")]
    fn render_fails(template: &str) {
        let err = render(template, &login_args()).unwrap_err();
        assert!(matches!(err, Error::Title { .. }), "unexpected error: {err}");
    }

    #[test]
    fn error_mentions_template() {
        let err = render("Hello {who}", &Args::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to render title \"Hello {who}\": argument \"who\" is missing"
        );
    }

    #[test]
    fn positional_and_named_arguments_are_independent() -> eyre::Result<()> {
        let args = Args::new()
            .positional(0, &"visa")
            .named("amount", &42);
        assert_eq!(render("{amount} by {0}", &args)?, "42 by visa");
        assert!(render("{card}", &args).is_err());
        assert!(render("{1}", &args).is_err());
        Ok(())
    }
}
