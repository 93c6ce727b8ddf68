//! Procedural macros for rabt.
//!
//! `#[capability]` turns a trait into a capability the container can put
//! behind an interception wrapper:
//!
//! ```rust,ignore
//! #[rabt::capability]
//! pub trait Mailer: Send + Sync {
//!     fn send(&self, to: &str, body: String) -> Result<(), InvocationError>;
//! }
//! ```
//!
//! generates a `MailerInterception` wrapper struct that routes every call
//! through the event pipeline, and `impl Interceptable for dyn Mailer`.
//!
//! Arguments:
//! - `wrapper = "Name"`: name of the generated wrapper struct
//! - `crate = "path"`: path to the rabt crate, `::rabt` by default

use std::env::var_os;

use proc_macro::TokenStream;
use quote::{ToTokens, quote};

mod capability;

#[proc_macro_attribute]
pub fn capability(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match capability::parse_args(attr.into()) {
        Ok(args) => args,
        Err(errors) => return errors.into(),
    };
    expand(syn::parse(item).and_then(|item| capability::expand(args, item)))
}

fn expand<T>(result: syn::Result<T>) -> TokenStream
where
    T: ToTokens,
{
    match result {
        Ok(tokens) => {
            let tokens = (quote! { #tokens }).into();
            if var_os("RABT_MACROS_DEBUG").is_some() {
                eprintln!("{tokens}");
            }
            tokens
        }
        Err(err) => err.into_compile_error().into(),
    }
}
