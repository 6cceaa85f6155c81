//! `$NAME` / `${NAME}` variable substitution (spec §4.2 "Variable substitution").
//!
//! Runs inside command handlers, not at dispatch time, so commands that take
//! quoted literals (`_MATCH`) can still see the raw, pre-substitution text
//! when they need it.

use wiretest_core::VarContext;

pub fn substitute(text: &str, vars: &VarContext) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            out.push(bytes[i] as char);
            i += 1;
            continue;
        }
        if i + 1 >= bytes.len() {
            out.push('$');
            break;
        }
        if bytes[i + 1] == b'{' {
            if let Some(end) = text[i + 2..].find('}') {
                let name = &text[i + 2..i + 2 + end];
                match vars.lookup(name) {
                    Some(v) => out.push_str(&v.to_string()),
                    None => out.push_str(&text[i..i + 3 + end]),
                }
                i += 3 + end;
                continue;
            }
            out.push('$');
            i += 1;
            continue;
        }
        let name_start = i + 1;
        let mut j = name_start;
        while j < bytes.len() && is_name_byte(bytes[j]) {
            j += 1;
        }
        if j == name_start {
            out.push('$');
            i += 1;
            continue;
        }
        let name = &text[name_start..j];
        match vars.lookup(name) {
            Some(v) => out.push_str(&v.to_string()),
            None => out.push_str(&text[i..j]),
        }
        i = j;
    }
    out
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiretest_core::GlobalVars;

    #[test]
    fn bare_and_braced_forms_resolve() {
        let mut ctx = VarContext::new(GlobalVars::new());
        ctx.set_worker("NAME", "world");
        assert_eq!(substitute("hello $NAME", &ctx), "hello world");
        assert_eq!(substitute("hello ${NAME}!", &ctx), "hello world!");
    }

    #[test]
    fn unresolved_name_is_left_literal() {
        let ctx = VarContext::new(GlobalVars::new());
        assert_eq!(substitute("x=$NOPE", &ctx), "x=$NOPE");
        assert_eq!(substitute("x=${NOPE}", &ctx), "x=${NOPE}");
    }

    #[test]
    fn lone_dollar_passes_through() {
        let ctx = VarContext::new(GlobalVars::new());
        assert_eq!(substitute("cost: $5", &ctx), "cost: $5");
        assert_eq!(substitute("trailing $", &ctx), "trailing $");
    }
}
