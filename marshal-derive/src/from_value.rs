use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use synstructure::Structure;

pub fn from_value_derive(s: Structure) -> TokenStream2 {
    let type_name = s.ast().ident.to_string();
    let multi_variant = s.variants().len() > 1;

    let arms = s.variants().iter().map(|variant| {
        let class_name = if multi_variant {
            format!("{}::{}", type_name, variant.ast().ident)
        } else {
            type_name.clone()
        };
        let construct = variant.construct(|field, i| {
            let ty = &field.ty;
            let field_name = field
                .ident
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| i.to_string());
            quote! {
                <#ty as marshal::FromValue>::from_value(
                    ivars.iter().find(|(name, _)| name.as_str() == #field_name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| marshal::Error::TypeMismatch {
                            expected: #field_name,
                            found: "<missing ivar>".to_string(),
                        })?
                )?
            }
        });
        quote! {
            #class_name => ::core::result::Result::Ok(#construct),
        }
    });

    s.gen_impl(quote! {
        gen impl marshal::FromValue for @Self {
            fn from_value(value: &marshal::Value) -> marshal::Result<Self> {
                match value {
                    marshal::Value::Object(rc) => {
                        let data = rc.borrow();
                        let ivars = &data.ivars;
                        match data.class.name.as_str() {
                            #(#arms)*
                            other => ::core::result::Result::Err(marshal::Error::TypeMismatch {
                                expected: #type_name,
                                found: other.to_string(),
                            }),
                        }
                    }
                    other => ::core::result::Result::Err(marshal::Error::TypeMismatch {
                        expected: #type_name,
                        found: other.type_name().to_string(),
                    }),
                }
            }
        }
    })
}
