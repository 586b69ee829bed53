/// An account allowed to log in. `id` is the subject written into its tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String, // Argon2 PHC string
}
