use crate::prelude::*;

struct Input {
    module: Ident,
    fields: Punctuated<Field, Token![,]>,
}

impl Parse for Input {
    fn parse(input: ParseStream) -> Result<Self> {
        let module = input.parse()?;
        input.parse::<Token![,]>()?;
        let fields = Punctuated::parse_terminated(input)?;
        Ok(Self { module, fields })
    }
}

struct Field {
    ident: Ident,
    operator: Option<Ident>,
    value: Expr,
}

const OPERATORS: [&str; 8] = ["Eq", "Ne", "Gt", "Gte", "Lt", "Lte", "In", "Nin"];

impl Parse for Field {
    fn parse(input: ParseStream) -> Result<Self> {
        let ident = input.parse()?;
        input.parse::<Token![:]>()?;

        let operator_or_value = input.parse::<Expr>()?;

        let mut operator_and_operand = None;

        if let Expr::Call(expr_call) = &operator_or_value {
            if let Expr::Path(expr_path) = expr_call.func.as_ref() {
                if let Some(ident) = expr_path.path.get_ident() {
                    if OPERATORS.iter().any(|operator| ident == operator)
                        && expr_call.args.len() == 1
                    {
                        operator_and_operand = Some((ident.clone(), expr_call.args[0].clone()));
                    }
                }
            }
        }

        let output = match operator_and_operand {
            Some((operator, operand)) => Self {
                ident,
                operator: Some(operator),
                value: operand,
            },
            None => Self {
                ident,
                operator: None,
                value: operator_or_value,
            },
        };

        Ok(output)
    }
}

pub fn func_construct_filter(input: TokenStream) -> Result<TokenStream> {
    let input = parse2::<Input>(input)?;

    let output = build(&input);

    Ok(output)
}

fn method_for(operator: Option<&Ident>) -> Ident {
    let name = match operator.map(ToString::to_string).as_deref() {
        Some("In") => "in_".to_owned(),
        Some(other) => other.to_snake_case(),
        None => "eq".to_owned(),
    };

    Ident::new(&name, operator.map_or_else(Span::call_site, Ident::span))
}

fn build(input: &Input) -> TokenStream {
    let krate = krate();
    let module = &input.module;

    let clauses = input.fields.iter().map(|field| {
        let ident = &field.ident;
        let method = method_for(field.operator.as_ref());
        let value = &field.value;

        quote! {
            #module::#ident().#method(#value)
        }
    });

    quote! {
        #krate::Expression::all([ #( #clauses ),* ])
    }
}
