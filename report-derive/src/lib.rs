//! # Report Derive
//!
//! Procedural macros for report.
//!
//! ## Macros
//!
//! - `#[report::step("..")]` - Reports every call of a function as a step of the caller
//! - `#[report::title("..")]` - Reports every call of a method as a test of its type
//! - `#[report::feature("..")]` - Declares a type as a root suite
//! - `#[report::story("..", extends(..))]` - Declares a type as a story under its
//!   nearest reported ancestor
//! - `#[report::class(extends(..))]` - Declares ancestry only
//!
//! These macros are automatically re-exported by the main `report` crate,
//! so users typically don't need to import this crate directly.

extern crate proc_macro;

mod template;

use itertools::Itertools;
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    parse::Parse, parse_macro_input, parse_quote, punctuated::Punctuated, Attribute, Expr,
    ExprLit, FnArg, Ident, Item, ItemFn, Lit, LitStr, Meta, Pat, ReturnType, Signature, Token,
    Type,
};

use crate::template::Field;

/// Arguments of the attributes: `"literal", suite = Type, extends(A, B)`, each part
/// optional at parse time.
#[derive(Default)]
struct Input {
    literal: Option<LitStr>,
    suite: Option<Type>,
    extends: Vec<Type>,
}

impl Parse for Input {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut parsed = Input::default();
        if input.peek(LitStr) {
            parsed.literal = Some(input.parse()?);
        }

        while !input.is_empty() {
            if parsed.literal.is_some() || !parsed.extends.is_empty() || parsed.suite.is_some() {
                input.parse::<Token![,]>()?;
                if input.is_empty() {
                    break;
                }
            }

            let ident: Ident = input.parse()?;
            if ident == "suite" {
                input.parse::<Token![=]>()?;
                parsed.suite = Some(input.parse()?);
            } else if ident == "extends" {
                let content;
                syn::parenthesized!(content in input);
                let bases: Punctuated<Type, Token![,]> =
                    content.parse_terminated(Type::parse, Token![,])?;
                parsed.extends.extend(bases);
            } else {
                return Err(syn::Error::new(
                    ident.span(),
                    format!("unknown argument `{ident}`, expected `suite` or `extends`"),
                ));
            }
        }

        Ok(parsed)
    }
}

impl Input {
    fn literal(&self, what: &str) -> syn::Result<&LitStr> {
        self.literal
            .as_ref()
            .ok_or_else(|| syn::Error::new(Span::call_site(), format!("expected {what}")))
    }

    fn forbid_suite(&self) -> syn::Result<()> {
        match &self.suite {
            Some(suite) => Err(syn::Error::new_spanned(suite, "`suite` is only accepted by `title`")),
            None => Ok(()),
        }
    }

    fn forbid_extends(&self) -> syn::Result<()> {
        match self.extends.first() {
            Some(base) => Err(syn::Error::new_spanned(
                base,
                "`extends` is only accepted by type attributes",
            )),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
enum ReturnKind {
    /// The function returns a `Result`; `Err` is a failure.
    Result,
    /// Anything else; only a panic is a failure.
    Plain,
}

/// Inspects the function's signature to determine how failures surface.
///
/// **Limitation:**
/// Proc macros only see tokens, so any type whose last path segment is `Result` is
/// taken for a `Result` (`eyre::Result`, `anyhow::Result`, `std::result::Result`, or
/// a local alias). Its error type must implement `From<report::Error>`.
fn inspect_return(sig: &Signature) -> ReturnKind {
    let ReturnType::Type(_, ty) = &sig.output else {
        return ReturnKind::Plain;
    };
    let Type::Path(type_path) = ty.as_ref() else {
        return ReturnKind::Plain;
    };
    match type_path.path.segments.last() {
        Some(last) if last.ident == "Result" => ReturnKind::Result,
        _ => ReturnKind::Plain,
    }
}

/// Joins the `///` doc comments of an item into one description.
fn doc_of(attrs: &[Attribute]) -> Option<String> {
    let doc = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) => Some(s.value()),
                _ => None,
            },
            _ => None,
        })
        .map(|line| line.strip_prefix(' ').map(str::to_string).unwrap_or(line))
        .join("\n");

    let doc = doc.trim();
    (!doc.is_empty()).then(|| doc.to_string())
}

fn description(attrs: &[Attribute]) -> TokenStream2 {
    match doc_of(attrs) {
        Some(doc) => quote!(::std::option::Option::Some(#doc)),
        None => quote!(::std::option::Option::None),
    }
}

/// A parameter of the decorated function. `self` is not counted.
struct Param {
    index: usize,
    ident: Option<Ident>,
}

fn parameters(sig: &Signature) -> Vec<Param> {
    sig.inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Receiver(_) => None,
            FnArg::Typed(pat_type) => Some(match pat_type.pat.as_ref() {
                Pat::Ident(pat) => Some(pat.ident.clone()),
                _ => None,
            }),
        })
        .enumerate()
        .map(|(index, ident)| Param { index, ident })
        .collect()
}

/// Builds the `.arg(..)` calls for the parameters `template` references.
fn template_args(template: &LitStr, params: &[Param]) -> syn::Result<Vec<TokenStream2>> {
    let fail = |reason: String| syn::Error::new(template.span(), reason);
    let fields = template::scan(&template.value())
        .map_err(|reason| fail(format!("invalid title template: {reason}")))?;

    let mut referenced = Vec::new();
    for field in fields {
        let param = match &field {
            Field::Index(index) => params.get(*index).ok_or_else(|| {
                fail(format!(
                    "template refers to parameter {index} but the function has {} parameters",
                    params.len()
                ))
            })?,
            Field::Name(name) => params
                .iter()
                .find(|param| param.ident.as_ref().is_some_and(|ident| ident == name))
                .ok_or_else(|| fail(format!("template refers to unknown parameter `{name}`")))?,
        };
        if !referenced.contains(&param.index) {
            referenced.push(param.index);
        }
    }

    referenced.sort_unstable();
    referenced
        .into_iter()
        .map(|index| {
            let ident = params[index].ident.as_ref().ok_or_else(|| {
                fail(format!(
                    "parameter {index} is not a plain identifier and cannot be used in a template"
                ))
            })?;
            let name = ident.to_string();
            Ok(quote!(.arg(#index, #name, &#ident)))
        })
        .collect()
}

enum Wrapper {
    Step,
    Title(TokenStream2),
}

fn instrument(wrapper: Wrapper, template: &LitStr, mut func: ItemFn) -> syn::Result<TokenStream2> {
    let args = template_args(template, &parameters(&func.sig))?;
    let key = func.sig.ident.to_string();
    let description = description(&func.attrs);
    let kind = inspect_return(&func.sig);
    let ret = match &func.sig.output {
        ReturnType::Default => quote!(()),
        ReturnType::Type(_, ty) => quote!(#ty),
    };
    let is_async = func.sig.asyncness.take().is_some();
    let body = &func.block;

    let callable = match (is_async, &kind) {
        (false, ReturnKind::Result) => quote! {
            ::report::Callable::sync(move || -> #ret #body)
        },
        (false, ReturnKind::Plain) => quote! {
            ::report::Callable::sync(move || ::report::Plain((move || -> #ret #body)()))
        },
        (true, ReturnKind::Result) => quote! {
            ::report::Callable::<#ret>::future(async move #body)
        },
        (true, ReturnKind::Plain) => quote! {
            ::report::Callable::<::report::Plain<#ret>>::future(async move {
                ::report::Plain::<#ret>(async move #body.await)
            })
        },
    };

    let invoke = match wrapper {
        Wrapper::Step => quote!(::report::step(__report_call, #callable)),
        Wrapper::Title(suite) => quote!(::report::title(#suite, __report_call, #callable)),
    };
    let invoke = match kind {
        ReturnKind::Result => invoke,
        ReturnKind::Plain => quote!(#invoke.into_inner()),
    };

    func.block = parse_quote!({
        let __report_call = ::report::Call::new(#key, #template)
            #(#args)*
            .description(#description);
        #invoke
    });

    Ok(quote!(#func))
}

#[derive(Clone, Copy)]
enum DeclarationKind {
    Feature,
    Story,
}

fn declare(
    kind: Option<DeclarationKind>,
    input: &Input,
    item: Item,
) -> syn::Result<TokenStream2> {
    let (ident, generics, attrs) = match &item {
        Item::Struct(s) => (&s.ident, &s.generics, &s.attrs),
        Item::Enum(e) => (&e.ident, &e.generics, &e.attrs),
        Item::Union(u) => (&u.ident, &u.generics, &u.attrs),
        other => {
            return Err(syn::Error::new_spanned(
                other,
                "report type attributes can only be applied to a struct, enum or union",
            ))
        }
    };
    if !generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            generics,
            "generic types cannot take part in a report hierarchy",
        ));
    }

    let name = ident.to_string();
    let doc = description(attrs);
    let bases = &input.extends;

    let submit = match kind {
        None => quote!(),
        Some(kind) => {
            let display = input.literal(match kind {
                DeclarationKind::Feature => "a feature name, e.g. #[report::feature(\"Checkout\")]",
                DeclarationKind::Story => "a story name, e.g. #[report::story(\"Pay by card\")]",
            })?;
            let kind = match kind {
                DeclarationKind::Feature => quote!(::report::DeclarationKind::Feature),
                DeclarationKind::Story => quote!(::report::DeclarationKind::Story),
            };
            quote! {
                // Submit declaration to inventory for registration at session start
                ::report::inventory::submit! {
                    ::report::Declaration {
                        kind: #kind,
                        name: #display,
                        class: <#ident as ::report::Class>::class_info,
                        module: module_path!(),
                        line: line!(),
                    }
                }
            }
        }
    };

    Ok(quote! {
        #item

        impl ::report::Class for #ident {
            const NAME: &'static str = #name;

            fn class_info() -> ::report::ClassInfo {
                ::report::ClassInfo::new(#name)
                    .doc(#doc)
                    #(.base(<#bases as ::report::Class>::class_info()))*
            }
        }

        #submit
    })
}

fn expand(result: syn::Result<TokenStream2>) -> TokenStream {
    result.unwrap_or_else(syn::Error::into_compile_error).into()
}

/// Reports every call of a function as a step of the test or step that calls it.
///
/// The template is rendered with the call's arguments: `{}`, `{0}` and `{name}` refer
/// to the parameters (not counting `self`), which must implement `Display`.
///
/// ```rust,ignore
/// #[report::step("Login as {user}")]
/// fn login(user: &str) -> eyre::Result<()> {
///     report::log("typing credentials")?;
///     Ok(())
/// }
/// ```
///
/// # Failures
///
/// - A function returning `Result` fails with `Err`; the error type must implement
///   `From<report::Error>` so reporting errors can be returned as well.
/// - Any other function fails by panicking; reporting errors panic too.
///
/// Either way the step is finished as failed and the failure reaches the caller
/// unchanged.
///
/// # Async
///
/// An `async fn` becomes a plain `fn` that drives the body to completion, so the
/// future has to be `Send`.
#[proc_macro_attribute]
pub fn step(args: TokenStream, input: TokenStream) -> TokenStream {
    let input_args = parse_macro_input!(args as Input);
    let input_fn = parse_macro_input!(input as ItemFn);

    expand(expand_step(&input_args, input_fn))
}

fn expand_step(input_args: &Input, input_fn: ItemFn) -> syn::Result<TokenStream2> {
    input_args.forbid_suite()?;
    input_args.forbid_extends()?;
    let template = input_args.literal("a step title, e.g. #[report::step(\"Login as {0}\")]")?;
    instrument(Wrapper::Step, template, input_fn)
}

/// Reports every call of a method as a test of the enclosing type.
///
/// The enclosing type must be declared with `feature`, `story` or `class`. Use
/// `suite = Type` for free functions or to report under another type.
///
/// ```rust,ignore
/// #[report::story("Payment")]
/// struct Payment;
///
/// impl Payment {
///     #[report::title("Pay {amount} by card")]
///     fn pay_by_card(&self, amount: u32) -> eyre::Result<()> {
///         Ok(())
///     }
/// }
/// ```
///
/// Unlike `step`, a failing test is left unfinished.
#[proc_macro_attribute]
pub fn title(args: TokenStream, input: TokenStream) -> TokenStream {
    let input_args = parse_macro_input!(args as Input);
    let input_fn = parse_macro_input!(input as ItemFn);

    expand(expand_title(&input_args, input_fn))
}

fn expand_title(input_args: &Input, input_fn: ItemFn) -> syn::Result<TokenStream2> {
    input_args.forbid_extends()?;
    let template = input_args.literal("a test title, e.g. #[report::title(\"Pay by {0}\")]")?;
    let suite = match &input_args.suite {
        Some(suite) => quote!(<#suite as ::report::Class>::NAME),
        None => quote!(<Self as ::report::Class>::NAME),
    };
    instrument(Wrapper::Title(suite), template, input_fn)
}

/// Declares a type as a feature: a root suite of the report.
///
/// ```rust,ignore
/// /// Everything about paying.
/// #[report::feature("Checkout")]
/// struct Checkout;
/// ```
#[proc_macro_attribute]
pub fn feature(args: TokenStream, input: TokenStream) -> TokenStream {
    let input_args = parse_macro_input!(args as Input);
    let item = parse_macro_input!(input as Item);

    expand(input_args.forbid_suite().and_then(|()| {
        declare(Some(DeclarationKind::Feature), &input_args, item)
    }))
}

/// Declares a type as a story, placed under its nearest reported ancestor.
///
/// ```rust,ignore
/// #[report::story("Pay by card", extends(Checkout))]
/// struct CardPayment;
/// ```
#[proc_macro_attribute]
pub fn story(args: TokenStream, input: TokenStream) -> TokenStream {
    let input_args = parse_macro_input!(args as Input);
    let item = parse_macro_input!(input as Item);

    expand(input_args.forbid_suite().and_then(|()| {
        declare(Some(DeclarationKind::Story), &input_args, item)
    }))
}

/// Declares the ancestry of a type that is not reported itself.
#[proc_macro_attribute]
pub fn class(args: TokenStream, input: TokenStream) -> TokenStream {
    let input_args = parse_macro_input!(args as Input);
    let item = parse_macro_input!(input as Item);

    expand(expand_class(&input_args, item))
}

fn expand_class(input_args: &Input, item: Item) -> syn::Result<TokenStream2> {
    input_args.forbid_suite()?;
    if let Some(literal) = &input_args.literal {
        return Err(syn::Error::new_spanned(
            literal,
            "`class` takes no name; use `feature` or `story` to report the type",
        ));
    }
    declare(None, input_args, item)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case("fn foo() -> eyre::Result<()>" => ReturnKind::Result; "eyre")]
    #[test_case("fn foo() -> anyhow::Result<u8>" => ReturnKind::Result; "anyhow")]
    #[test_case("fn foo() -> std::result::Result<(), E>" => ReturnKind::Result; "std_result")]
    #[test_case("fn foo() -> Result<(), E>" => ReturnKind::Result; "bare")]
    #[test_case("fn foo() -> u32" => ReturnKind::Plain; "plain")]
    #[test_case("fn foo()" => ReturnKind::Plain; "unit")]
    #[test_case("fn foo() -> (u8, u8)" => ReturnKind::Plain; "tuple")]
    fn inspect_return(s: &str) -> ReturnKind {
        let sig: Signature = syn::parse_str(s).expect("failed to parse function signature");
        super::inspect_return(&sig)
    }

    #[test]
    fn doc_lines_are_joined() {
        let func: ItemFn = syn::parse_quote! {
            /// Pays the cart.
            ///
            /// Uses the saved card.
            #[inline]
            fn pay() {}
        };
        assert_eq!(
            doc_of(&func.attrs).as_deref(),
            Some("Pays the cart.\n\nUses the saved card.")
        );
    }

    #[test]
    fn missing_doc_is_none() {
        let func: ItemFn = syn::parse_quote!(fn pay() {});
        assert_eq!(doc_of(&func.attrs), None);
    }

    #[test_case("\"Login\"" => (true, false, 0); "literal only")]
    #[test_case("\"Pay\", suite = Checkout" => (true, true, 0); "suite")]
    #[test_case("\"Pay\", extends(A, b::B)" => (true, false, 2); "extends")]
    #[test_case("extends(A)" => (false, false, 1); "class")]
    #[test_case("" => (false, false, 0); "empty")]
    #[test_case("\"Pay\", extends(A),"  => (true, false, 1); "trailing comma")]
    fn parse_input(s: &str) -> (bool, bool, usize) {
        let input: Input = syn::parse_str(s).expect("failed to parse attribute input");
        (input.literal.is_some(), input.suite.is_some(), input.extends.len())
    }

    #[test]
    fn unknown_argument_is_rejected() {
        let err = syn::parse_str::<Input>("\"Pay\", retries = 3").err().unwrap();
        assert!(err.to_string().contains("unknown argument `retries`"));
    }

    fn args_for(sig: &str, template: &str) -> syn::Result<Vec<String>> {
        let sig: Signature = syn::parse_str(sig).expect("failed to parse function signature");
        let template = LitStr::new(template, Span::call_site());
        template_args(&template, &parameters(&sig))
            .map(|args| {
                args.into_iter()
                    .map(|arg| arg.to_string().replace(' ', ""))
                    .collect()
            })
    }

    #[test_case("fn f(user: &str)", "Login as {0}" => vec![".arg(0usize,\"user\",&user)"]; "positional")]
    #[test_case("fn f(&self, user: &str)", "Login as {user}" => vec![".arg(0usize,\"user\",&user)"]; "named skips self")]
    #[test_case("fn f(a: u8, b: u8)", "{1} {0} {1}" => vec![".arg(0usize,\"a\",&a)", ".arg(1usize,\"b\",&b)"]; "each parameter once")]
    #[test_case("fn f(a: u8, secret: &str)", "Only {a}" => vec![".arg(0usize,\"a\",&a)"]; "unreferenced parameters are not rendered")]
    #[test_case("fn f(a: u8)", "Static" => Vec::<String>::new(); "no fields")]
    fn template_arguments(sig: &str, template: &str) -> Vec<String> {
        args_for(sig, template).expect("template should be accepted")
    }

    #[test_case("fn f(a: u8)", "{1}" => "template refers to parameter 1 but the function has 1 parameters"; "index out of range")]
    #[test_case("fn f(&self)", "{0}" => "template refers to parameter 0 but the function has 0 parameters"; "self is not a parameter")]
    #[test_case("fn f(a: u8)", "{b}" => "template refers to unknown parameter `b`"; "unknown name")]
    #[test_case("fn f((a, b): (u8, u8))", "{0}" => "parameter 0 is not a plain identifier and cannot be used in a template"; "pattern")]
    #[test_case("fn f(a: u8)", "{0:>3}" => "invalid title template: only plain argument fields are supported, got {0:>3}"; "format spec")]
    fn template_errors(sig: &str, template: &str) -> String {
        args_for(sig, template).err().unwrap().to_string()
    }

    #[test]
    fn async_step_becomes_sync() {
        let func: ItemFn = syn::parse_quote! {
            async fn fetch(id: u32) -> eyre::Result<u32> { Ok(id) }
        };
        let template = LitStr::new("Fetch {id}", Span::call_site());
        let out = instrument(Wrapper::Step, &template, func).unwrap();
        let out: ItemFn = syn::parse2(out).unwrap();
        assert!(out.sig.asyncness.is_none());
        assert_eq!(out.block.stmts.len(), 2);
    }

    #[test]
    fn generic_types_are_rejected() {
        let item: Item = syn::parse_quote!(struct Wrapper<T>(T););
        let err = declare(None, &Input::default(), item).err().unwrap();
        assert!(err.to_string().contains("generic types"));
    }

    #[test]
    fn functions_cannot_be_declared() {
        let item: Item = syn::parse_quote!(fn nope() {});
        assert!(declare(None, &Input::default(), item).is_err());
    }
}
