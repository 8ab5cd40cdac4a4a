//! Service registry: path prefix → backend base URL.
//!
//! # Responsibilities
//! - Compile configured services once at startup
//! - Resolve a request path to its service by longest prefix
//! - Build the outbound target URL for a resolved service
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan, longest first (eight services in practice)
//! - A service with a malformed URL stays in the table as disabled, so its
//!   prefix fails closed instead of falling through to a shorter one

use url::Url;

use crate::config::ServiceConfig;
use crate::error::GatewayError;
use crate::routing::matcher::PathPrefix;

/// A service that requests can be forwarded to.
#[derive(Debug, Clone)]
pub struct ServiceRoute {
    pub name: String,
    pub prefix: PathPrefix,
    pub base_url: Url,
    pub strip_prefix: bool,
}

impl ServiceRoute {
    /// Outbound URL for an inbound path and query.
    ///
    /// The base URL's own path is kept as a mount point; the inbound path
    /// (minus the prefix when `strip_prefix` is set) is appended to it.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Url {
        let forwarded = if self.strip_prefix {
            self.prefix.remainder(path).unwrap_or("/")
        } else {
            path
        };

        let mut target = self.base_url.clone();
        let mount = self.base_url.path().trim_end_matches('/');
        target.set_path(&format!("{}{}", mount, forwarded));
        target.set_query(query);
        target.set_fragment(None);
        target
    }
}

#[derive(Debug, Clone)]
enum RouteEntry {
    Active(ServiceRoute),
    Disabled { name: String, prefix: PathPrefix },
}

impl RouteEntry {
    fn prefix(&self) -> &PathPrefix {
        match self {
            RouteEntry::Active(route) => &route.prefix,
            RouteEntry::Disabled { prefix, .. } => prefix,
        }
    }
}

/// Compiled, immutable route table.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    entries: Vec<RouteEntry>,
}

impl ServiceRegistry {
    pub fn from_config(services: &[ServiceConfig]) -> Self {
        let mut entries: Vec<RouteEntry> = services
            .iter()
            .map(|service| {
                let prefix = PathPrefix::new(service.path_prefix.as_str());
                match parse_backend_url(&service.url) {
                    Ok(base_url) => {
                        tracing::info!(
                            service = %service.name,
                            prefix = %prefix.as_str(),
                            target = %base_url,
                            "Service registered"
                        );
                        RouteEntry::Active(ServiceRoute {
                            name: service.name.clone(),
                            prefix,
                            base_url,
                            strip_prefix: service.strip_prefix,
                        })
                    }
                    Err(reason) => {
                        tracing::error!(
                            service = %service.name,
                            prefix = %prefix.as_str(),
                            reason,
                            "Invalid backend URL, route disabled"
                        );
                        RouteEntry::Disabled {
                            name: service.name.clone(),
                            prefix,
                        }
                    }
                }
            })
            .collect();

        // Stable sort keeps configuration order among equal lengths.
        entries.sort_by(|a, b| b.prefix().len().cmp(&a.prefix().len()));
        Self { entries }
    }

    /// Resolve a path to its service.
    pub fn resolve(&self, path: &str) -> Result<&ServiceRoute, GatewayError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.prefix().matches(path))
            .ok_or_else(|| GatewayError::NoRoute {
                path: path.to_string(),
            })?;

        match entry {
            RouteEntry::Active(route) => Ok(route),
            RouteEntry::Disabled { name, .. } => Err(GatewayError::RouteDisabled {
                service: name.clone(),
            }),
        }
    }

    /// Services that can be forwarded to.
    pub fn routes(&self) -> impl Iterator<Item = &ServiceRoute> {
        self.entries.iter().filter_map(|entry| match entry {
            RouteEntry::Active(route) => Some(route),
            RouteEntry::Disabled { .. } => None,
        })
    }

    /// Names of services disabled at startup.
    pub fn disabled(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| match entry {
            RouteEntry::Disabled { name, .. } => Some(name.as_str()),
            RouteEntry::Active(_) => None,
        })
    }
}

/// A backend base URL must be absolute http(s) with a non-empty host.
fn parse_backend_url(raw: &str) -> Result<Url, &'static str> {
    let url = Url::parse(raw.trim()).map_err(|_| "not an absolute URL")?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err("scheme must be http or https");
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host");
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err("credentials in URL are not allowed");
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    fn service(name: &str, prefix: &str, url: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.into(),
            path_prefix: prefix.into(),
            url: url.into(),
            url_env: None,
            strip_prefix: false,
        }
    }

    #[test]
    fn test_default_services_resolve() {
        let registry = ServiceRegistry::from_config(&GatewayConfig::default().services.routes);
        assert_eq!(registry.routes().count(), 8);

        for (path, name) in [
            ("/api/auth/login", "auth"),
            ("/api/restaurants", "restaurants"),
            ("/api/menu/42", "menu"),
            ("/api/orders/1/status", "orders"),
            ("/api/cart", "cart"),
            ("/api/deliveries/track", "deliveries"),
            ("/api/payment/intent", "payment"),
            ("/api/notifications/", "notifications"),
        ] {
            assert_eq!(registry.resolve(path).unwrap().name, name, "{path}");
        }
    }

    #[test]
    fn test_unknown_path() {
        let registry = ServiceRegistry::from_config(&GatewayConfig::default().services.routes);
        assert!(matches!(
            registry.resolve("/api/unknown"),
            Err(GatewayError::NoRoute { .. })
        ));
        assert!(matches!(
            registry.resolve("/api/authx"),
            Err(GatewayError::NoRoute { .. })
        ));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let registry = ServiceRegistry::from_config(&[
            service("api", "/api", "http://api:1"),
            service("menu", "/api/menu", "http://menu:2"),
        ]);
        assert_eq!(registry.resolve("/api/menu/1").unwrap().name, "menu");
        assert_eq!(registry.resolve("/api/other").unwrap().name, "api");
    }

    #[test]
    fn test_invalid_url_disables_route() {
        let registry = ServiceRegistry::from_config(&[
            service("api", "/api", "http://api:1"),
            service("menu", "/api/menu", "menu-service:5002"),
            service("cart", "/api/cart", "ftp://cart"),
            service("orders", "/api/orders", "http://user:pw@orders"),
        ]);
        assert_eq!(registry.routes().count(), 1);
        let mut disabled: Vec<_> = registry.disabled().collect();
        disabled.sort();
        assert_eq!(disabled, vec!["cart", "menu", "orders"]);

        // fails closed: the shorter `/api` prefix does not catch it
        assert!(matches!(
            registry.resolve("/api/menu/1"),
            Err(GatewayError::RouteDisabled { service }) if service == "menu"
        ));
    }

    #[test]
    fn test_target_url_keeps_full_path_and_query() {
        let registry = ServiceRegistry::from_config(&[service("auth", "/api/auth", "http://auth:5001")]);
        let route = registry.resolve("/api/auth/login").unwrap();
        let target = route.target_url("/api/auth/login", Some("next=%2Fhome"));
        assert_eq!(target.as_str(), "http://auth:5001/api/auth/login?next=%2Fhome");
    }

    #[test]
    fn test_target_url_strip_prefix_and_mount() {
        let mut config = service("menu", "/api/menu", "https://menu.internal/v2/");
        config.strip_prefix = true;
        let registry = ServiceRegistry::from_config(&[config]);
        let route = registry.resolve("/api/menu/12").unwrap();

        assert_eq!(
            route.target_url("/api/menu/12", None).as_str(),
            "https://menu.internal/v2/12"
        );
        assert_eq!(route.target_url("/api/menu", None).as_str(), "https://menu.internal/v2/");
    }

    #[test]
    fn test_target_url_cannot_change_authority() {
        let registry = ServiceRegistry::from_config(&[service("auth", "/api/auth", "http://auth:5001")]);
        let route = registry.resolve("/api/auth//evil.example/x").unwrap();
        let target = route.target_url("/api/auth//evil.example/x", None);
        assert_eq!(target.host_str(), Some("auth"));
        assert_eq!(target.port(), Some(5001));
    }
}
