//! Filters that answer on their own and never call the rest of the chain.
use axum::body::Body;
use hyper::{
    Response, StatusCode,
    header::{HeaderValue, LOCATION},
};

use super::SettingsReader;

fn status_or(reader: &mut SettingsReader<'_>, default: StatusCode) -> StatusCode {
    let code = reader.u64_or("status_code", u64::from(default.as_u16()));
    u16::try_from(code)
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .unwrap_or_else(|| {
            reader.warn("status_code", format!("{code} is not an HTTP status; using {default}"));
            default
        })
}

fn empty_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

#[derive(Debug)]
pub struct RedirectToFilter {
    location: HeaderValue,
    status: StatusCode,
}

impl RedirectToFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        let url = reader.string_or("url", "");
        let location = if url.is_empty() {
            reader.warn("url", "missing; redirecting to '/'");
            HeaderValue::from_static("/")
        } else {
            HeaderValue::from_str(&url).unwrap_or_else(|_| {
                reader.warn("url", format!("'{url}' is not a valid Location; redirecting to '/'"));
                HeaderValue::from_static("/")
            })
        };
        Self {
            location,
            status: status_or(reader, StatusCode::FOUND),
        }
    }

    pub(super) fn respond(&self) -> Response<Body> {
        let mut response = empty_response(self.status);
        response.headers_mut().insert(LOCATION, self.location.clone());
        response
    }
}

#[derive(Debug)]
pub struct SetStatusFilter {
    status: StatusCode,
}

impl SetStatusFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        Self {
            status: status_or(reader, StatusCode::OK),
        }
    }

    pub(super) fn respond(&self) -> Response<Body> {
        empty_response(self.status)
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use hyper::Request;

    use super::*;
    use crate::{config::models::FilterSpec, core::chain::tests_support::run_filters};

    fn get() -> Request<Body> {
        Request::builder().uri("/old").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_redirect_defaults_to_302() {
        let (response, endpoint) = run_filters(
            vec![FilterSpec::new("RedirectTo").with_setting("url", "https://example.com/new")],
            get(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "https://example.com/new");
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_redirect_with_custom_status() {
        let (response, _) = run_filters(
            vec![
                FilterSpec::new("RedirectTo")
                    .with_setting("url", "/moved")
                    .with_setting("status_code", 301),
            ],
            get(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    }

    #[tokio::test]
    async fn test_set_status_defaults_to_200() {
        let (response, endpoint) = run_filters(vec![FilterSpec::new("SetStatus")], get()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(endpoint.calls(), 0);
    }

    #[test]
    fn test_out_of_range_status_falls_back() {
        let spec = FilterSpec::new("SetStatus").with_setting("status_code", 99999);
        let mut reader = SettingsReader::new(&spec);
        let filter = SetStatusFilter::from_settings(&mut reader);
        assert_eq!(filter.status, StatusCode::OK);
        assert_eq!(reader.finish().len(), 1);
    }
}
