use darling::FromMeta;
use darling::ast::NestedMeta;
use proc_macro2::TokenStream;
use quote::{ToTokens, format_ident, quote, quote_spanned};
use syn::spanned::Spanned;
use syn::{
    FnArg, GenericArgument, GenericParam, Ident, ItemTrait, Pat, PatIdent, Path, PathArguments, ReturnType,
    TraitBound, TraitItem, TraitItemFn, Type, TypeParamBound, parse_quote,
};

#[derive(Debug, Default, FromMeta)]
#[darling(default)]
pub(crate) struct CapabilityArgs {
    wrapper: Option<Ident>,
    #[darling(rename = "crate")]
    krate: Option<Path>,
}

pub(crate) fn parse_args(attr: TokenStream) -> Result<CapabilityArgs, TokenStream> {
    let items = NestedMeta::parse_meta_list(attr).map_err(|err| darling::Error::from(err).write_errors())?;
    CapabilityArgs::from_list(&items).map_err(|err| err.write_errors())
}

pub(crate) fn expand(args: CapabilityArgs, item: ItemTrait) -> syn::Result<TokenStream> {
    check_trait(&item)?;

    let krate = args.krate.unwrap_or_else(|| parse_quote!(::rabt));
    let vis = &item.vis;
    let name = &item.ident;
    let wrapper = args
        .wrapper
        .unwrap_or_else(|| format_ident!("{}Interception", name));

    let methods = item
        .items
        .iter()
        .map(|member| match member {
            TraitItem::Fn(method) => forward(method),
            other => Err(syn::Error::new_spanned(
                other,
                "capability traits may only declare methods",
            )),
        })
        .collect::<syn::Result<Vec<_>>>()?;

    let doc = format!("Interception wrapper for `dyn {name}`.");

    Ok(quote! {
        #item

        #[doc = #doc]
        #vis struct #wrapper(#krate::interception::Intercepted<dyn #name>);

        impl #name for #wrapper {
            #(#methods)*
        }

        impl #krate::interception::Interceptable for dyn #name {
            fn intercept(core: #krate::interception::Intercepted<Self>) -> ::std::sync::Arc<Self> {
                ::std::sync::Arc::new(#wrapper(core))
            }
        }
    })
}

fn check_trait(item: &ItemTrait) -> syn::Result<()> {
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "capability traits cannot be generic",
        ));
    }
    if let Some(unsafety) = &item.unsafety {
        return Err(syn::Error::new_spanned(unsafety, "capability traits cannot be unsafe"));
    }
    for bound in &item.supertraits {
        match bound {
            TypeParamBound::Trait(bound) if is_marker(bound, "Send") || is_marker(bound, "Sync") => {}
            TypeParamBound::Lifetime(_) => {}
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "capability traits cannot have supertraits other than `Send` and `Sync`",
                ));
            }
        }
    }
    for marker in ["Send", "Sync"] {
        if !requires(item, marker) {
            return Err(syn::Error::new_spanned(
                &item.ident,
                "capability traits must require `Send + Sync`",
            ));
        }
    }
    Ok(())
}

fn requires(item: &ItemTrait, marker: &str) -> bool {
    item.supertraits.iter().any(|bound| match bound {
        TypeParamBound::Trait(bound) => is_marker(bound, marker),
        _ => false,
    })
}

fn is_marker(bound: &TraitBound, marker: &str) -> bool {
    bound.path.segments.last().is_some_and(|segment| segment.ident == marker)
}

/// The first non-`'static` borrow inside `ty`.
///
/// Intercepted results are handed to interceptors as `dyn Any`, which
/// rules out anything borrowed.
fn borrowed(ty: &Type) -> Option<TokenStream> {
    match ty {
        Type::Reference(reference) => match &reference.lifetime {
            Some(lifetime) if lifetime.ident == "static" => borrowed(&reference.elem),
            _ => Some(reference.to_token_stream()),
        },
        Type::Path(path) => path.path.segments.iter().find_map(|segment| match &segment.arguments {
            PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
                GenericArgument::Type(ty) => borrowed(ty),
                GenericArgument::Lifetime(lifetime) if lifetime.ident != "static" => {
                    Some(lifetime.to_token_stream())
                }
                _ => None,
            }),
            _ => None,
        }),
        Type::Tuple(tuple) => tuple.elems.iter().find_map(borrowed),
        Type::Array(array) => borrowed(&array.elem),
        Type::Slice(slice) => borrowed(&slice.elem),
        Type::Paren(paren) => borrowed(&paren.elem),
        Type::Group(group) => borrowed(&group.elem),
        _ => None,
    }
}

/// The wrapper's implementation of one capability method.
fn forward(method: &TraitItemFn) -> syn::Result<TokenStream> {
    let sig = &method.sig;

    if sig.asyncness.is_some() {
        return Err(syn::Error::new_spanned(sig, "async methods cannot be intercepted"));
    }
    if sig.unsafety.is_some() {
        return Err(syn::Error::new_spanned(sig, "unsafe methods cannot be intercepted"));
    }
    if sig
        .generics
        .params
        .iter()
        .any(|param| !matches!(param, GenericParam::Lifetime(_)))
    {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "generic methods cannot be intercepted",
        ));
    }
    if let Some(clause) = &sig.generics.where_clause {
        return Err(syn::Error::new_spanned(
            clause,
            "where clauses on capability methods are not supported",
        ));
    }
    match sig.receiver() {
        Some(receiver) if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(syn::Error::new_spanned(sig, "capability methods must take `&self`"));
        }
    }
    match &sig.output {
        ReturnType::Default => {
            return Err(syn::Error::new_spanned(
                sig,
                "capability methods must return `Result<_, InvocationError>`",
            ));
        }
        ReturnType::Type(_, ty) => {
            if let Some(borrow) = borrowed(ty) {
                return Err(syn::Error::new_spanned(
                    borrow,
                    "capability methods cannot return borrowed data",
                ));
            }
        }
    }

    let mut wrapper_sig = sig.clone();
    let mut args = Vec::new();
    let mut debug_checks = Vec::new();
    for (index, input) in wrapper_sig
        .inputs
        .iter_mut()
        .filter_map(|input| match input {
            FnArg::Typed(typed) => Some(typed),
            FnArg::Receiver(_) => None,
        })
        .enumerate()
    {
        let ident = format_ident!("arg{}", index);
        // arguments are shown to interceptors as `dyn Debug`
        let ty = &input.ty;
        debug_checks.push(quote_spanned! {ty.span()=>
            let _ = <#ty as ::core::fmt::Debug>::fmt;
        });
        input.pat = Box::new(Pat::Ident(PatIdent {
            attrs: Vec::new(),
            by_ref: None,
            mutability: None,
            ident: ident.clone(),
            subpat: None,
        }));
        args.push(ident);
    }

    let method_name = &sig.ident;
    let label = method_name.to_string();

    Ok(quote! {
        #wrapper_sig {
            #(#debug_checks)*
            self.0.invoke(#label, (#(#args,)*), |target, (#(#args,)*)| target.#method_name(#(#args),*))
        }
    })
}
