use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, parse_macro_input};

#[proc_macro_derive(FormRecord)]
pub fn derive_form_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormRecord derive supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let record_ident = input.ident;
    let fields_struct_ident = format_ident!("{record_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormRecord derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormRecord derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let calmform = calmform_path();
    let mut key_methods = Vec::new();
    let mut inserts = Vec::new();
    let mut reads = Vec::new();

    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        let field_ty = field.ty;
        let field_name = field_ident.to_string();

        key_methods.push(quote! {
            pub const fn #field_ident(&self) -> #calmform::form::FieldKey {
                #calmform::form::FieldKey::new(#field_name)
            }
        });

        inserts.push(quote! {
            values.insert(
                #calmform::form::FieldKey::new(#field_name),
                #calmform::form::IntoFieldValue::into_field_value(self.#field_ident),
            );
        });

        reads.push(quote! {
            #field_ident: <#field_ty as #calmform::form::FromFieldValue>::from_field_value(
                values.get(#field_name),
            )
            .ok_or_else(|| #calmform::form::FormError::RecordField {
                field: #field_name.to_owned(),
                expected: <#field_ty as #calmform::form::FromFieldValue>::EXPECTED,
            })?,
        });
    }

    quote! {
        #[derive(Clone, Copy, Debug, Default)]
        pub struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#key_methods)*
        }

        impl #calmform::form::FormRecord for #record_ident {
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }

            fn into_values(self) -> #calmform::form::FormValues {
                let mut values = #calmform::form::FormValues::new();
                #(#inserts)*
                values
            }

            fn from_values(
                values: &#calmform::form::FormValues,
            ) -> #calmform::form::FormResult<Self> {
                Ok(Self {
                    #(#reads)*
                })
            }
        }
    }
    .into()
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calmform),
    }
}
