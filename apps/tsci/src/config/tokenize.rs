//! Splitting of free-form flag strings such as `args` and `tailscaled-args`.
//!
//! Tokens are separated by whitespace. A double-quoted run is part of the
//! current token with its quotes removed and its interior kept verbatim, so
//! `--advertise-routes="10.0.0.0/8 192.168.0.0/16"` stays one token. Escaped
//! quotes are not recognized. An unterminated quote runs to the end of input.

/// Splits `input` into tokens.
#[must_use]
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in input.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    tokens
}
