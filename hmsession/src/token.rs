use std::fmt;

//--------------------------------------------------------------------------------------------------
// Bearer Token Type
//--------------------------------------------------------------------------------------------------

/// An access token issued by the hospital auth service.
///
/// The client never inspects the signature. `Debug` output is redacted so the token cannot leak
/// into logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        BearerToken(token.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

impl From<&str> for BearerToken {
    fn from(s: &str) -> Self {
        BearerToken::new(s)
    }
}

impl From<String> for BearerToken {
    fn from(s: String) -> Self {
        BearerToken::new(s)
    }
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_token() {
        let token = BearerToken::new("aaa.bbb.ccc");
        assert_eq!(format!("{:?}", token), "BearerToken(<redacted>)");
        assert_eq!(token.authorization_header(), "Bearer aaa.bbb.ccc");
    }
}
