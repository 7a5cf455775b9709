extern crate proc_macro;

use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemFn, LitStr, Stmt, meta::ParseNestedMeta, parse_macro_input, parse_quote};

/// Unit the elapsed time on the exit event is reported in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Unit {
    #[default]
    Nanos,
    Micros,
    Millis,
    Seconds,
}

impl Unit {
    fn parse(lit: &LitStr) -> syn::Result<Self> {
        match lit.value().as_str() {
            "ns" | "nanos" | "nanoseconds" => Ok(Self::Nanos),
            "us" | "micros" | "microseconds" => Ok(Self::Micros),
            "ms" | "millis" | "milliseconds" => Ok(Self::Millis),
            "s" | "secs" | "seconds" => Ok(Self::Seconds),
            other => Err(syn::Error::new(
                lit.span(),
                format!("unknown precision `{other}`, expected one of ns, us, ms, s"),
            )),
        }
    }

    /// The `(amount, suffix)` pair describing `elapsed`, a `Duration` in scope.
    fn render(self) -> (TokenStream, &'static str) {
        match self {
            Self::Nanos => (quote!(elapsed.as_nanos()), "ns"),
            Self::Micros => (quote!(elapsed.as_micros()), "us"),
            Self::Millis => (quote!(elapsed.as_millis()), "ms"),
            Self::Seconds => (quote!(elapsed.as_secs()), "s"),
        }
    }
}

/// What `#[traced(...)]` was asked to do.
#[derive(Default)]
struct Options {
    /// Arguments forwarded to `#[tracing::instrument]`
    instrument: Option<TokenStream>,
    timing: Option<Unit>,
}

impl Options {
    fn parse(&mut self, meta: &ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("instrument") {
            if self.instrument.is_some() {
                return Err(meta.error("`instrument` given more than once"));
            }

            let arguments = if meta.input.peek(syn::token::Paren) {
                let content;
                syn::parenthesized!(content in meta.input);
                content.parse()?
            } else {
                TokenStream::new()
            };
            self.instrument = Some(arguments);

            Ok(())
        } else if meta.path.is_ident("timing") {
            if self.timing.is_some() {
                return Err(meta.error("`timing` given more than once"));
            }

            let mut unit = Unit::default();
            if meta.input.peek(syn::token::Paren) {
                meta.parse_nested_meta(|inner| {
                    if inner.path.is_ident("precision") {
                        unit = Unit::parse(&inner.value()?.parse::<LitStr>()?)?;
                        Ok(())
                    } else {
                        Err(inner.error("expected `precision = \"..\"`"))
                    }
                })?;
            }
            self.timing = Some(unit);

            Ok(())
        } else {
            Err(meta.error("expected `instrument` or `timing`"))
        }
    }

    /// The statement opening the function body: emits the entry event and
    /// binds a guard whose drop emits the exit event.
    fn guard(&self, name: &str) -> Stmt {
        // Untimed guards carry `()` so there is no start time left unread
        let (field, start, exit) = self.timing.map_or_else(
            || {
                (
                    quote!(()),
                    quote!(()),
                    quote! { tracing::trace!("{} exited", #name); },
                )
            },
            |unit| {
                let (amount, suffix) = unit.render();
                (
                    quote!(std::time::Instant),
                    quote!(std::time::Instant::now()),
                    quote! {
                        let elapsed = self.0.elapsed();
                        tracing::trace!("{} exited ({} {} elapsed)", #name, #amount, #suffix);
                    },
                )
            },
        );

        parse_quote! {
            let __traced_exit = {
                struct ExitEvent(#field);

                impl std::ops::Drop for ExitEvent {
                    fn drop(&mut self) {
                        #exit
                    }
                }

                tracing::trace!("{} entered", #name);
                ExitEvent(#start)
            };
        }
    }
}

/// Emit `tracing::trace!` events when the attributed function is entered and
/// when it returns.
///
/// - `instrument(...)` also applies `#[tracing::instrument(...)]` with the
///   given arguments
/// - `timing(precision = "ms")` adds the elapsed time to the exit event; the
///   precision is one of `ns` (the default), `us`, `ms` or `s`
///
/// On an `async fn` the exit event fires when the future completes or is
/// dropped.
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let mut options = Options::default();
    let parser = syn::meta::parser(|meta| options.parse(&meta));
    parse_macro_input!(args with parser);

    let mut item_fn = parse_macro_input!(item as ItemFn);

    if let Some(arguments) = &options.instrument {
        item_fn
            .attrs
            .push(parse_quote! { #[tracing::instrument(#arguments)] });
    }

    let name = item_fn.sig.ident.to_string();
    item_fn.block.stmts.insert(0, options.guard(&name));

    quote! { #item_fn }.into()
}
