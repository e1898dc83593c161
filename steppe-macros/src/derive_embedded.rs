use crate::{
    prelude::*,
    utils::{
        build_helper_module, extract_field_configs, extract_named_fields, reject_generics,
        reject_serde_rename_all,
    },
};

pub fn derive_embedded(item: TokenStream) -> Result<TokenStream> {
    let input = parse2::<DeriveInput>(item)?;

    reject_generics(&input)?;
    reject_serde_rename_all(&input.attrs)?;

    let fields_named = extract_named_fields(input.span(), input.data)?;
    let fields = extract_field_configs(fields_named)?;

    let output = build_helper_module(&input.vis, &input.ident, &fields, None);

    Ok(output)
}
