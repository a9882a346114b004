use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Runs the function body on a fresh `aryn` runtime.
///
/// The function returns once the runtime is quiescent, with whatever its body returned.
/// Panics if the runtime stops on a failure.
#[proc_macro_attribute]
pub fn start(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = parse_macro_input!(item as ItemFn);

    let attributes = &item.attrs;
    let visibility = &item.vis;
    let signature = &item.sig;
    let body = &item.block;

    let result = quote! {
        #(#attributes)*
        #visibility #signature {
            ::aryn::runtime::start(move || #body).expect("aryn runtime stopped on a failure")
        }
    };

    result.into()
}
