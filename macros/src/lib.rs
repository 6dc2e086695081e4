use proc_macro::{self, TokenStream};
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Fields};

///
/// A derive macro which implements TryFrom<u8> for a fieldless enum. Used for
/// the one-byte tags at the front of every wire message.
///
/// Every variant must be a unit variant. Discriminants are read with
/// `Variant as u8`, so explicit values and gaps are fine. Unknown bytes are
/// handed back as the error so the codec can report which tag it saw.
///
/// usage:
/// ```rust
/// #[derive(TryFromByte)]
/// #[repr(u8)]
/// enum PacketType { Ping = 0, Data = 1 }
/// ```
///
#[proc_macro_derive(TryFromByte)]
pub fn try_from_byte(input: TokenStream) -> TokenStream {
    // parse the code into DeriveInput
    let DeriveInput { ident, data, .. } = parse_macro_input!(input);
    let enum_item = match data {
        syn::Data::Enum(enum_item) => enum_item,
        _ => panic!("TryFromByte only works on Enums"),
    };
    // one comparison per variant, checked in declaration order
    let arms = enum_item.variants.iter().map(|variant| {
        if !matches!(variant.fields, Fields::Unit) {
            panic!("TryFromByte only works on fieldless variants");
        }
        let variant_ident = &variant.ident;
        quote! {
            if x == #ident::#variant_ident as u8 {
                return Ok(#ident::#variant_ident);
            }
        }
    });
    let output = quote! {
        impl std::convert::TryFrom<u8> for #ident {
            type Error = u8;
            fn try_from(x: u8) -> std::result::Result<Self, Self::Error> {
                #(#arms)*
                Err(x)
            }
        }
    };
    output.into()
}
