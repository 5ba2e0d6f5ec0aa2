//! Built-in admin extension: login/logout, the auth guard for `/admin`,
//! the dashboard page, and permission-scoped menu projection.
//!
//! Markup here is deliberately minimal; full template rendering belongs to
//! an external collaborator.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{CurrentUser, Principal, UserDirectory};
use crate::dispatch::RegistryHandle;
use crate::error::ApiError;
use crate::extend::{
    handler, render, AdminPage, Extension, Middleware, Resource, RouteRule, SideMenuItem,
};
use crate::flow::Flow;
use crate::session::{CurrentSession, SessionManager};

/// Priority of the `/admin` auth guard; runs after the session middleware
pub const ADMIN_GUARD_PRIORITY: i32 = 50;

/// Permission required to administer the host
pub const ADMIN_PERMISSION: &str = "admin";

/// Build the admin extension. Resources are declared most-specific first;
/// the sub-route catch-all and the root redirect come last so they cannot
/// shadow login/logout.
pub fn extension(
    sessions: Arc<SessionManager>,
    users: Arc<dyn UserDirectory>,
) -> Result<Extension, crate::extend::RouteError> {
    let login_sessions = sessions.clone();
    let logout_sessions = sessions.clone();
    let login_users = users.clone();

    let ext = Extension::new("admin", "Admin")
        .description("Administration interface")
        .internal(true)
        .resource(Resource::new(
            RouteRule::new("GET", "/admin/login")?,
            "Login form",
            handler(login_page),
        ))
        .resource(Resource::new(
            RouteRule::new("POST", "/admin/login")?,
            "Credential submission",
            handler(move |flow: Arc<Flow>| {
                let sessions = login_sessions.clone();
                let users = login_users.clone();
                async move { login_submit(flow, sessions, users).await }
            }),
        ))
        .resource(Resource::new(
            RouteRule::new("*", "/admin/logout")?,
            "End the current session",
            handler(move |flow: Arc<Flow>| {
                let sessions = logout_sessions.clone();
                async move { logout(flow, sessions).await }
            }),
        ))
        .resource(Resource::new(
            RouteRule::new("*", "/admin/.+")?,
            "Admin sub-routes",
            handler(sub_route),
        ))
        .resource(Resource::new(
            RouteRule::new("GET", "/admin/?")?,
            "Admin root redirect",
            handler(root_redirect),
        ))
        .on_init(Arc::new(|registry| {
            registry.add_side_menu_item("Home", "dashboard", 0, "", "")?;
            registry.add_side_menu_item("System", "#", 500, "", ADMIN_PERMISSION)?;
            registry.add_side_menu_item("Logout", "logout", 1000, "System", "")?;

            registry.register_admin_page(
                AdminPage::new("dashboard", render(dashboard)).with_permission(""),
            )?;

            registry.register_middleware(guard_middleware()?)?;
            Ok(())
        }));

    Ok(ext)
}

/// Auth guard over `/admin`: unauthenticated requests (except the login
/// surface itself) are redirected to the login page and the flow stops.
fn guard_middleware() -> Result<Middleware, crate::extend::RouteError> {
    let rule = RouteRule::new("*", "^/admin.*$")?;
    let action = handler(|flow: Arc<Flow>| async move {
        if flow.path().starts_with("/admin/login") {
            return;
        }
        if flow.extension::<CurrentSession>().is_none() {
            tracing::debug!(path = %flow.path(), "No session - directing to login");
            flow.redirect("/admin/login", StatusCode::FOUND);
            flow.terminate();
        }
    });
    Ok(Middleware::new(rule, ADMIN_GUARD_PRIORITY, action))
}

// ---- Handlers ----

async fn root_redirect(flow: Arc<Flow>) {
    if flow.extension::<CurrentUser>().is_some() {
        flow.redirect("/admin/dashboard", StatusCode::FOUND);
    } else {
        flow.redirect("/admin/login", StatusCode::FOUND);
    }
}

async fn login_page(flow: Arc<Flow>) {
    if flow.extension::<CurrentUser>().is_some() {
        flow.redirect("/admin/dashboard", StatusCode::FOUND);
        return;
    }
    let csrf = Uuid::new_v4().to_string();
    let error = flow
        .get_nested("templateData", "error")
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default();
    flow.write_html(StatusCode::OK, &login_form_html(&csrf, &error));
}

async fn login_submit(flow: Arc<Flow>, sessions: Arc<SessionManager>, users: Arc<dyn UserDirectory>) {
    let username = flow.form_value("username").unwrap_or_default();
    let password = flow.form_value("password").unwrap_or_default();
    let csrf = flow.form_value("_csrf").unwrap_or_default();

    if username.is_empty() || password.is_empty() {
        flow.write_html(
            StatusCode::UNAUTHORIZED,
            &login_form_html(&csrf, "Username or password is empty"),
        );
        return;
    }

    let user = match users.validate_login(&username, &password).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            flow.write_html(
                StatusCode::UNAUTHORIZED,
                &login_form_html(&csrf, "Invalid username or password"),
            );
            return;
        }
        Err(err) => {
            flow.write_api_error(&ApiError::from(err));
            return;
        }
    };

    if !user.has_permission(ADMIN_PERMISSION) {
        flow.write_html(
            StatusCode::FORBIDDEN,
            &login_form_html(&csrf, "You are not an admin and cannot access this page."),
        );
        return;
    }

    if let Err(err) = sessions.create_session(&flow, &csrf, user.id).await {
        flow.write_api_error(&ApiError::from(err));
        return;
    }

    flow.redirect("/admin/dashboard", StatusCode::FOUND);
}

async fn logout(flow: Arc<Flow>, sessions: Arc<SessionManager>) {
    if let Err(err) = sessions.end_session(&flow).await {
        tracing::error!("Failed to end session: {}", err);
    }
    flow.redirect("/admin/login", StatusCode::FOUND);
}

/// Resolve `/admin/...` through the admin-page template matcher, enforce
/// the page's permission, and render it inside the admin chrome.
async fn sub_route(flow: Arc<Flow>) {
    let registry = match flow.extension::<RegistryHandle>() {
        Some(RegistryHandle(registry)) => registry,
        None => {
            flow.write_error_json(StatusCode::INTERNAL_SERVER_ERROR, "Registry unavailable");
            return;
        }
    };
    let user = match flow.extension::<CurrentUser>() {
        Some(CurrentUser(user)) => user,
        None => {
            flow.redirect("/admin/login", StatusCode::FOUND);
            return;
        }
    };

    let menu = scoped_menu(&user, flow.path(), &registry.side_menu());
    flow.append_nested("templateData", "sideNav", json!(menu));

    let (page, params) = match registry.admin_page_for(flow.path()) {
        Some(found) => found,
        None => {
            flow.write_error_json(StatusCode::NOT_FOUND, "The requested admin page could not be found");
            return;
        }
    };

    if !user.has_permission(&page.permission) {
        flow.write_error_json(
            StatusCode::FORBIDDEN,
            "You do not have permission to view this page",
        );
        return;
    }

    for (key, value) in params {
        flow.append_nested("admin_meta", &key, json!(value));
    }

    match (page.render)(flow.clone()).await {
        Ok(content) => {
            flow.write_html(StatusCode::OK, &admin_shell_html(&menu, &content));
        }
        Err(err) => {
            flow.write_api_error(&err);
        }
    }
}

async fn dashboard(flow: Arc<Flow>) -> Result<String, ApiError> {
    let name = flow
        .extension::<CurrentUser>()
        .map(|CurrentUser(user)| user.name)
        .unwrap_or_else(|| "there".to_string());
    Ok(format!("<h1>Dashboard</h1><p>Welcome back, {}.</p>", name))
}

// ---- Menu projection ----

/// Project the side menu for one principal and request path: permission
/// filtering, active flags by path prefix, and the first-child path rule
/// for `#` grouping nodes.
pub fn scoped_menu(principal: &dyn Principal, path: &str, items: &[SideMenuItem]) -> Vec<Value> {
    let mut menu = Vec::new();

    for item in items {
        if !principal.has_permission(&item.permission) {
            continue;
        }

        let mut children = Vec::new();
        let mut has_active_child = false;

        for child in &item.children {
            if !principal.has_permission(&child.permission) {
                continue;
            }
            let active = path.starts_with(&child.path);
            has_active_child = has_active_child || active;
            children.push(json!({
                "title": child.title,
                "path": child.path,
                "active": active,
            }));
        }

        let effective_path = if item.is_group() {
            match item.children.iter().find(|c| principal.has_permission(&c.permission)) {
                Some(first) => first.path.clone(),
                None => item.path.clone(),
            }
        } else {
            item.path.clone()
        };

        menu.push(json!({
            "title": item.title,
            "path": effective_path,
            "active": has_active_child || (effective_path != "#" && path.starts_with(&effective_path)),
            "children": children,
        }));
    }

    menu
}

// ---- Markup ----

fn login_form_html(csrf: &str, error: &str) -> String {
    let error_block = if error.is_empty() {
        String::new()
    } else {
        format!("<p class=\"error\">{}</p>", error)
    };
    format!(
        "<!doctype html><html><head><title>Sign in</title></head><body>\
         <h1>Sign in</h1>{error_block}\
         <form method=\"post\" action=\"/admin/login\">\
         <input type=\"hidden\" name=\"_csrf\" value=\"{csrf}\">\
         <label>Username <input name=\"username\"></label>\
         <label>Password <input name=\"password\" type=\"password\"></label>\
         <button type=\"submit\">Sign in</button>\
         </form></body></html>"
    )
}

fn admin_shell_html(menu: &[Value], content: &str) -> String {
    let mut nav = String::new();
    for item in menu {
        let title = item["title"].as_str().unwrap_or_default();
        let path = item["path"].as_str().unwrap_or("#");
        nav.push_str(&format!("<a href=\"{}\">{}</a>", path, title));
    }
    format!(
        "<!doctype html><html><head><title>Admin</title></head><body>\
         <nav>{nav}</nav><main>{content}</main></body></html>"
    )
}
