//! Procedural macros for SchemaBridge
//!
//! This crate provides `#[derive(Record)]`, which implements
//! `schema_bridge::RecordModel` for a struct with named fields.
//!
//! ```ignore
//! #[derive(Record)]
//! #[record(table = "CheckingAccount")]
//! struct CheckingAccountRow {
//!     #[record(primary_key)]
//!     id: i64,
//!     #[record(nested)]
//!     user: Box<UserRow>,
//!     balance: f64,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, GenericArgument, Ident, LitStr,
    PathArguments, Type,
};

/// Derive macro for `RecordModel`
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_record(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(error) => TokenStream::from(error.to_compile_error()),
    }
}

/// Struct-level `#[record(...)]` options
#[derive(Default)]
struct RecordOptions {
    table: Option<String>,
    view: bool,
}

/// Field-level `#[record(...)]` options
#[derive(Default)]
struct FieldOptions {
    primary_key: bool,
    unique: bool,
    default: bool,
    nested: bool,
    references: Option<(String, String)>,
    rename: Option<String>,
}

fn record_options(attrs: &[Attribute]) -> syn::Result<RecordOptions> {
    let mut options = RecordOptions::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                options.table = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("view") {
                options.view = true;
                Ok(())
            } else {
                Err(meta.error("unsupported record attribute, expected `table` or `view`"))
            }
        })?;
    }
    Ok(options)
}

fn field_options(attrs: &[Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary_key") {
                options.primary_key = true;
            } else if meta.path.is_ident("unique") {
                options.unique = true;
            } else if meta.path.is_ident("default") {
                options.default = true;
            } else if meta.path.is_ident("nested") {
                options.nested = true;
            } else if meta.path.is_ident("references") {
                let value: LitStr = meta.value()?.parse()?;
                let text = value.value();
                match text.rsplit_once('.') {
                    Some((table, column)) if !table.is_empty() && !column.is_empty() => {
                        options.references = Some((table.to_string(), column.to_string()));
                    }
                    _ => return Err(syn::Error::new(value.span(), "expected \"Table.column\"")),
                }
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                options.rename = Some(value.value());
            } else {
                return Err(meta.error(
                    "unsupported record attribute, expected one of `primary_key`, `unique`, \
                     `default`, `nested`, `references`, `rename`",
                ));
            }
            Ok(())
        })?;
    }
    Ok(options)
}

/// Single generic argument of `Wrapper<T>` when the last path segment is `wrapper`
fn unwrap_type<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}

fn type_name(ty: &Type) -> String {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|s| s.ident.to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

struct FieldCode {
    shape: TokenStream2,
    value: TokenStream2,
    init: TokenStream2,
}

fn scalar_field(ident: &Ident, ty: &Type, column: &str, options: &FieldOptions) -> FieldCode {
    let name = ident.to_string();
    let primary_key = options.primary_key;
    let unique = options.unique;
    let has_default = options.default;
    let references = match &options.references {
        Some((table, target)) => quote! {
            ::std::option::Option::Some(::schema_bridge::schema::types::ForeignKeyRef::new(#table, #target))
        },
        None => quote! { ::std::option::Option::None },
    };

    FieldCode {
        shape: quote! {
            ::schema_bridge::models::record::FieldShape {
                name: #name.to_string(),
                column: #column.to_string(),
                kind: ::schema_bridge::models::record::FieldKind::Scalar(
                    <#ty as ::schema_bridge::models::record::ScalarField>::SEMANTIC_TYPE,
                ),
                optional: <#ty as ::schema_bridge::models::record::ScalarField>::NULLABLE,
                has_default: #has_default,
                primary_key: #primary_key,
                unique: #unique,
                references: #references,
            }
        },
        value: quote! {
            values.push((
                #column.to_string(),
                ::schema_bridge::db::value::ToSqlValue::to_sql_value(&self.#ident),
            ));
        },
        init: quote! {
            #ident: row.decode::<#ty>(#column)?
        },
    }
}

fn nested_field(ident: &Ident, ty: &Type, column: &str, options: &FieldOptions) -> syn::Result<FieldCode> {
    if options.references.is_some() || options.unique {
        return Err(syn::Error::new_spanned(
            ident,
            "nested fields take their references from the target's primary key",
        ));
    }

    let (optional, inner) = match unwrap_type(ty, "Option") {
        Some(inner) => (true, inner),
        None => (false, ty),
    };
    let (boxed, target) = match unwrap_type(inner, "Box") {
        Some(target) => (true, target),
        None => (false, inner),
    };

    let name = ident.to_string();
    let target_name = type_name(target);
    let primary_key = options.primary_key;
    let has_default = options.default;

    let access = match (optional, boxed) {
        (false, false) => quote! { ::std::option::Option::Some(&self.#ident) },
        (false, true) => quote! { ::std::option::Option::Some(&*self.#ident) },
        (true, false) => quote! { self.#ident.as_ref() },
        (true, true) => quote! { self.#ident.as_deref() },
    };

    Ok(FieldCode {
        shape: quote! {
            ::schema_bridge::models::record::FieldShape {
                name: #name.to_string(),
                column: #column.to_string(),
                kind: ::schema_bridge::models::record::FieldKind::Nested(
                    ::schema_bridge::models::record::NestedTarget {
                        name: #target_name.to_string(),
                        shape: ::std::option::Option::Some(
                            <#target as ::schema_bridge::models::record::RecordModel>::shape,
                        ),
                    },
                ),
                optional: #optional,
                has_default: #has_default,
                primary_key: #primary_key,
                unique: false,
                references: ::std::option::Option::None,
            }
        },
        value: quote! {
            values.extend(::schema_bridge::models::record::nested_key_values::<#target>(#column, #access)?);
        },
        init: TokenStream2::new(),
    })
}

fn expand_record(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Record can only be derived for structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(ident, "Record can only be derived for structs")),
    };

    let options = record_options(&input.attrs)?;
    let rust_name = ident.to_string();
    let table = match options.table {
        Some(table) => table,
        None => match rust_name.strip_suffix("Row") {
            Some(base) if !base.is_empty() => base.to_string(),
            _ => rust_name.clone(),
        },
    };
    let view = options.view;

    let mut shapes = Vec::new();
    let mut values = Vec::new();
    let mut inits = Vec::new();
    let mut has_nested = false;

    for field in fields {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let field_options = field_options(&field.attrs)?;
        let column = field_options
            .rename
            .clone()
            .unwrap_or_else(|| field_ident.to_string().trim_start_matches("r#").to_string());

        let code = if field_options.nested {
            has_nested = true;
            nested_field(field_ident, &field.ty, &column, &field_options)?
        } else {
            scalar_field(field_ident, &field.ty, &column, &field_options)
        };
        shapes.push(code.shape);
        values.push(code.value);
        inits.push(code.init);
    }

    let from_row = if has_nested {
        quote! {
            let _ = row;
            ::std::result::Result::Err(::schema_bridge::Error::UnsupportedOperation(format!(
                "cannot read '{}': records with nested fields are write-only",
                #table
            )))
        }
    } else {
        quote! {
            ::std::result::Result::Ok(Self { #(#inits),* })
        }
    };

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::schema_bridge::models::record::RecordModel for #ident #ty_generics #where_clause {
            fn shape() -> ::schema_bridge::models::record::RecordShape {
                ::schema_bridge::models::record::RecordShape {
                    name: #table.to_string(),
                    rust_name: #rust_name.to_string(),
                    view: #view,
                    fields: vec![#(#shapes),*],
                }
            }

            fn to_values(
                &self,
            ) -> ::schema_bridge::Result<::std::vec::Vec<(::std::string::String, ::schema_bridge::db::value::SqlValue)>> {
                #[allow(unused_mut)]
                let mut values = ::std::vec::Vec::new();
                #(#values)*
                ::std::result::Result::Ok(values)
            }

            fn from_row(row: &::schema_bridge::db::connection::Row) -> ::schema_bridge::Result<Self> {
                #from_row
            }
        }
    })
}
