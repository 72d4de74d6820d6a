use crate::models::{Claims, TokenType};
use jsonwebtoken::{DecodingKey, Validation, decode};

/// Verifies signature and expiry, and only accepts access tokens.
pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("refresh tokens cannot be used for API calls".to_string());
    }
    Ok(claims)
}


#[cfg(test)]
mod tests {
    use super::testing::token;
    use super::*;

    #[test]
    fn accepts_valid_access_token() {
        let claims = verify_access_token(&token(7, 3, TokenType::Access, "s3cret", 600), "s3cret").unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.sub, "user7");
    }

    #[test]
    fn rejects_refresh_expired_and_foreign_tokens() {
        assert!(verify_access_token(&token(7, 3, TokenType::Refresh, "s3cret", 600), "s3cret").is_err());
        assert!(verify_access_token(&token(7, 3, TokenType::Access, "s3cret", -600), "s3cret").is_err());
        assert!(verify_access_token(&token(7, 3, TokenType::Access, "other", 600), "s3cret").is_err());
    }
}
