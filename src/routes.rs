use actix_files::NamedFile;
use actix_identity::Identity;
use actix_web::{
    get, post,
    web::{self, Data},
    HttpMessage, HttpRequest, HttpResponse,
};
use serde::Deserialize;
use tera::Context;

use crate::db::{self, UserStore};
use crate::errors::{AppError, RegisterError, RentError};
use crate::mpesa;
use crate::rate_limit::LoginRateLimiter;
use crate::summary;
use crate::{AppState, TEMPLATES};

fn render(template: &str, context: &Context) -> Result<HttpResponse, AppError> {
    let rendered = TEMPLATES.render(template, context).map_err(|e| {
        log::error!("Failed to render template {}: {}", template, e);
        AppError::TemplateError(e)
    })?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(rendered))
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header(("Location", location.to_owned()))
        .finish()
}

fn signed_in_user(identity: &Option<Identity>) -> Option<i64> {
    let id = identity.as_ref()?.id().ok()?;
    id.parse().ok()
}

fn client_addr(request: &HttpRequest) -> String {
    request
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_owned()
}

// ---------------------------------------------------------------- auth

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

fn login_view(error: Option<&str>) -> Result<HttpResponse, AppError> {
    let mut context = Context::new();
    context.insert("title", "Login");
    context.insert("error", &error);
    render("login.html", &context)
}

#[get("/login")]
pub async fn login_handler() -> Result<HttpResponse, AppError> {
    login_view(None)
}

#[post("/login")]
pub async fn login_form_handler(
    web::Form(form): web::Form<LoginForm>,
    state: Data<AppState>,
    limiter: Data<LoginRateLimiter>,
    request: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let addr = client_addr(&request);

    // Throttled attempts are rejected before the store is consulted.
    if !limiter.check(&addr) {
        log::warn!("Rate-limited login attempt from {}", addr);
        return login_view(Some("Too many attempts. Try again later."));
    }

    match db::authenticate(&state.db_pool, &form.username, &form.password).await {
        Ok(Some(user)) => {
            limiter.record_success(&addr);
            Identity::login(&request.extensions(), user.id.to_string())
                .map_err(|e| AppError::SessionError(e.to_string()))?;
            Ok(see_other("/"))
        }
        Ok(None) => {
            limiter.record_failure(&addr);
            log::warn!("Failed login for {:?} from {}", form.username, addr);
            login_view(Some("Invalid credentials"))
        }
        Err(e) => {
            log::error!("Login lookup failed: {}", e);
            login_view(Some("Database error"))
        }
    }
}

#[derive(Deserialize)]
pub struct SignupForm {
    username: String,
    password: String,
}

fn signup_view(error: Option<&str>) -> Result<HttpResponse, AppError> {
    let mut context = Context::new();
    context.insert("title", "Sign up");
    context.insert("error", &error);
    render("signup.html", &context)
}

#[get("/signup")]
pub async fn signup_handler() -> Result<HttpResponse, AppError> {
    signup_view(None)
}

#[post("/signup")]
pub async fn signup_form_handler(
    web::Form(form): web::Form<SignupForm>,
    state: Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, AppError> {
    if form.username.is_empty() || form.password.is_empty() {
        return signup_view(Some("All fields required"));
    }

    match db::create_user(&state.db_pool, &form.username, &form.password).await {
        Ok(user) => {
            Identity::login(&request.extensions(), user.id.to_string())
                .map_err(|e| AppError::SessionError(e.to_string()))?;
            Ok(see_other("/"))
        }
        Err(RegisterError::DuplicateUsername) => signup_view(Some("Username already exists")),
        Err(e) => {
            log::error!("Signup failed: {}", e);
            signup_view(Some("Database error"))
        }
    }
}

#[get("/logout")]
pub async fn logout_handler(identity: Option<Identity>) -> HttpResponse {
    if let Some(user) = identity {
        user.logout();
    }
    see_other("/login")
}

// ----------------------------------------------------------- dashboard

async fn dashboard_view(
    store: &UserStore<'_>,
    error: Option<&str>,
) -> Result<HttpResponse, AppError> {
    let records = store.rent_records().await?;
    let tenants = store.tenants().await?;
    let totals = summary::monthly_totals(&records);

    let mut context = Context::new();
    context.insert("title", "Dashboard");
    context.insert("records", &records);
    context.insert("tenants", &tenants);
    context.insert("totals", &totals);
    context.insert("error", &error);
    context.insert("version", env!("CARGO_PKG_VERSION"));
    render("index.html", &context)
}

#[get("/")]
pub async fn index_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = signed_in_user(&identity) else {
        return Ok(see_other("/login"));
    };
    let store = UserStore::scoped(&state.db_pool, user_id);
    dashboard_view(&store, None).await
}

// ---------------------------------------------------------------- rent

#[derive(Deserialize)]
pub struct AddRentForm {
    tenant_id: i64,
    month: String,
    amount: f64,
    date_collected: String,
    notes: Option<String>,
}

#[post("/add")]
pub async fn add_rent_handler(
    web::Form(form): web::Form<AddRentForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = signed_in_user(&identity) else {
        return Ok(see_other("/login"));
    };
    let store = UserStore::scoped(&state.db_pool, user_id);

    match store
        .add_rent(
            form.tenant_id,
            &form.month,
            form.amount,
            &form.date_collected,
            form.notes.as_deref(),
        )
        .await
    {
        Ok(_) => Ok(see_other("/")),
        // Covers both a nonexistent tenant and someone else's; the client
        // cannot tell which.
        Err(RentError::UnknownTenant) => Ok(HttpResponse::Forbidden().body("Access denied")),
        Err(RentError::Database(e)) => Err(AppError::DatabaseError(e)),
    }
}

#[derive(Deserialize)]
pub struct ParseForm {
    message: String,
}

#[post("/parse")]
pub async fn parse_mpesa_handler(
    web::Form(form): web::Form<ParseForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = signed_in_user(&identity) else {
        return Ok(see_other("/login"));
    };
    let store = UserStore::scoped(&state.db_pool, user_id);

    match mpesa::parse_payment(&form.message) {
        Ok(payment) => {
            store.record_payment(&payment).await?;
            Ok(see_other("/"))
        }
        Err(e) => dashboard_view(&store, Some(&e.to_string())).await,
    }
}

#[post("/delete/{id}")]
pub async fn delete_rent_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = signed_in_user(&identity) else {
        return Ok(see_other("/login"));
    };
    UserStore::scoped(&state.db_pool, user_id)
        .delete_rent(path.into_inner())
        .await?;
    Ok(see_other("/"))
}

#[get("/edit/{id}")]
pub async fn edit_rent_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = signed_in_user(&identity) else {
        return Ok(see_other("/login"));
    };
    let store = UserStore::scoped(&state.db_pool, user_id);

    let Some(record) = store.rent_record(path.into_inner()).await? else {
        return Ok(see_other("/"));
    };
    let tenants = store.tenants().await?;

    let mut context = Context::new();
    context.insert("title", "Edit rent record");
    context.insert("record", &record);
    context.insert("tenants", &tenants);
    render("edit.html", &context)
}

#[derive(Deserialize)]
pub struct EditRentForm {
    month: String,
    amount: f64,
    date_collected: String,
    notes: Option<String>,
}

#[post("/edit/{id}")]
pub async fn edit_rent_form_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<EditRentForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = signed_in_user(&identity) else {
        return Ok(see_other("/login"));
    };
    UserStore::scoped(&state.db_pool, user_id)
        .update_rent(
            path.into_inner(),
            &form.month,
            form.amount,
            &form.date_collected,
            form.notes.as_deref(),
        )
        .await?;
    Ok(see_other("/"))
}

// ------------------------------------------------------------- tenants

#[get("/tenants")]
pub async fn tenants_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = signed_in_user(&identity) else {
        return Ok(see_other("/login"));
    };
    let tenants = UserStore::scoped(&state.db_pool, user_id)
        .tenants()
        .await?;

    let mut context = Context::new();
    context.insert("title", "Tenants");
    context.insert("tenants", &tenants);
    render("tenants.html", &context)
}

#[derive(Deserialize)]
pub struct TenantForm {
    name: String,
    phone: String,
}

#[post("/tenants/add")]
pub async fn add_tenant_handler(
    web::Form(form): web::Form<TenantForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = signed_in_user(&identity) else {
        return Ok(see_other("/login"));
    };
    UserStore::scoped(&state.db_pool, user_id)
        .add_tenant(&form.name, &form.phone)
        .await?;
    Ok(see_other("/tenants"))
}

#[post("/tenants/delete/{id}")]
pub async fn delete_tenant_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = signed_in_user(&identity) else {
        return Ok(see_other("/login"));
    };
    UserStore::scoped(&state.db_pool, user_id)
        .delete_tenant(path.into_inner())
        .await?;
    Ok(see_other("/tenants"))
}

// ----------------------------------------------------- summary, export

#[get("/summary")]
pub async fn summary_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = signed_in_user(&identity) else {
        return Ok(see_other("/login"));
    };
    let records = UserStore::scoped(&state.db_pool, user_id)
        .rent_records()
        .await?;

    let mut context = Context::new();
    context.insert("title", "Summary");
    context.insert("monthly_totals", &summary::monthly_totals(&records));
    context.insert("tenant_totals", &summary::tenant_totals(&records));
    render("summary.html", &context)
}

#[get("/export")]
pub async fn export_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let Some(user_id) = signed_in_user(&identity) else {
        return Ok(see_other("/login"));
    };
    let records = UserStore::scoped(&state.db_pool, user_id)
        .rent_records()
        .await?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .append_header((
            "Content-Disposition",
            "attachment; filename=\"rent-records.csv\"",
        ))
        .body(summary::export_csv(&records)))
}

/// favicon handler
#[get("/favicon")]
pub async fn favicon_handler() -> Result<NamedFile, AppError> {
    Ok(NamedFile::open("static/favicon.ico")?)
}
