use super::handlers::{health, me, session, twofactor, users};
use utoipa::openapi::{InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both
/// served and documented.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path.
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(users::signup))
        .routes(routes!(users::me_public))
        .routes(routes!(session::signin))
        .routes(routes!(session::verify_two_factor))
        .routes(routes!(session::refresh))
        .routes(routes!(session::logout_all))
        .routes(routes!(me::get_me))
        .routes(routes!(me::change_credential))
        .routes(routes!(me::delete_me))
        .routes(routes!(twofactor::generate_secret))
        .routes(routes!(twofactor::enable))
        .routes(routes!(twofactor::disable));

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Challenge-response signin and token lifecycle".to_string());

    let mut me_tag = Tag::new("me");
    me_tag.description = Some("Authenticated self-service".to_string());

    let mut twofactor_tag = Tag::new("2fa");
    twofactor_tag.description = Some("TOTP enrollment and step-up".to_string());

    router.get_openapi_mut().tags = Some(vec![auth_tag, me_tag, twofactor_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(tags.iter().any(|tag| tag.name == "2fa"));
        assert!(spec.paths.paths.contains_key("/v1/sign-in"));
        assert!(spec.paths.paths.contains_key("/v1/sign-in/2fa"));
        assert!(spec.paths.paths.contains_key("/v1/me-public/{username}"));
        assert!(spec.paths.paths.contains_key("/v1/log-out-all"));
    }
}
