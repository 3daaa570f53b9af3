use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::{Attribute, Token};

// 拆分属性：返回（非 derive 属性, 已有 derive 路径）
fn split_derives(attrs: &[Attribute]) -> (Vec<Attribute>, Vec<syn::Path>) {
    let mut retained = Vec::new();
    let mut existing = Vec::new();

    for attr in attrs {
        if !attr.path().is_ident("derive") {
            retained.push(attr.clone());
            continue;
        }

        if let Ok(list) =
            attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
        {
            existing.extend(list);
        }
    }

    (retained, existing)
}

// 归一化 derive 的 key，避免 Serialize 与 serde::Serialize 重复
fn derive_key(p: &syn::Path) -> String {
    match p.segments.last() {
        Some(last) => {
            let ident = last.ident.to_string();
            match ident.as_str() {
                "Serialize" | "Deserialize" => format!("serde::{ident}"),
                _ => ident,
            }
        }
        None => p.to_token_stream().to_string(),
    }
}

// 合并必需与已有 derive（去重，必需项在前）
fn merge_derives(existing: Vec<syn::Path>, required: Vec<syn::Path>) -> Attribute {
    let mut seen = std::collections::HashSet::<String>::new();
    let merged: Vec<syn::Path> = required
        .into_iter()
        .chain(existing)
        .filter(|p| seen.insert(derive_key(p)))
        .collect();

    syn::parse_quote!(#[derive(#(#merged),*)])
}

/// 在 attrs 上应用派生合并：合并后的 derive 置于最前，其余属性保持原顺序
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<syn::Path>) {
    let (retained, existing) = split_derives(attrs);
    let merged = merge_derives(existing, required);
    *attrs = std::iter::once(merged).chain(retained).collect();
}

/// 解析 `debug = true|false` 形式的开关参数（两个宏共用）
pub(crate) struct DebugFlag {
    pub(crate) derive_debug: bool,
}

impl syn::parse::Parse for DebugFlag {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        if input.is_empty() {
            return Ok(Self { derive_debug: true });
        }

        let key: syn::Ident = input.parse()?;
        if key != "debug" {
            return Err(syn::Error::new(
                key.span(),
                "unknown key in attribute; expected 'debug'",
            ));
        }

        let _eq: Token![=] = input.parse()?;
        let lit: syn::LitBool = input.parse()?;

        if !input.is_empty() {
            return Err(input.error("unexpected tokens after 'debug = <bool>'"));
        }

        Ok(Self {
            derive_debug: lit.value(),
        })
    }
}
