//! Page handlers for signed-in users.

use askama::Template;
use axum::response::Html;

use crate::auth::RequireUser;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub display_name: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// GET / - Home page for the signed-in user
pub async fn index(RequireUser(current): RequireUser) -> Html<String> {
    let user = current.user;
    let template = IndexTemplate {
        display_name: user.display_name,
        username: user.username,
        avatar_url: user.avatar_url,
    };
    Html(template.render().unwrap_or_default())
}
