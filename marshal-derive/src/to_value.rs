use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use synstructure::Structure;

pub fn to_value_derive(s: Structure) -> TokenStream2 {
    let type_name = s.ast().ident.to_string();
    let multi_variant = s.variants().len() > 1;

    let arms = s.variants().iter().map(|variant| {
        let pat = variant.pat();
        let class_name = if multi_variant {
            format!("{}::{}", type_name, variant.ast().ident)
        } else {
            type_name.clone()
        };
        let field_pairs = variant.bindings().iter().enumerate().map(|(i, binding)| {
            let field_name = binding
                .ast()
                .ident
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| i.to_string());
            quote! {
                (marshal::Symbol::new(#field_name), marshal::ToValue::to_value(#binding))
            }
        });
        quote! {
            #pat => {
                let class = ::std::rc::Rc::new(marshal::registry::ClassDef {
                    name: (#class_name).to_string(),
                    kind: marshal::registry::ClassKind::Class,
                    struct_members: ::core::option::Option::None,
                    hooks: marshal::registry::Hooks::default(),
                });
                let ivars = ::std::vec![ #(#field_pairs),* ];
                marshal::Value::Object(::std::rc::Rc::new(::std::cell::RefCell::new(
                    marshal::value::ObjectData { class, ivars }
                )))
            }
        }
    });

    s.gen_impl(quote! {
        gen impl marshal::ToValue for @Self {
            fn to_value(&self) -> marshal::Value {
                match self {
                    #(#arms)*
                }
            }
        }
    })
}
