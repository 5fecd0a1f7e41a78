//! Client for the user-directory (auth) service.
//!
//! Bulk jobs need two things from it: the registration-date boundary of the
//! population, re-read at every invocation so growth between runs is picked
//! up, and the users registered inside a chunk's `[start, end)` range.

use async_trait::async_trait;
use chrono::NaiveDate;

use courier_common::error::AppError;
use courier_common::types::{BoundaryRange, UserDetail, UserRole};

/// Population surface consumed by bulk fan-out.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Registration dates of the earliest and latest user, optionally
    /// restricted to a role.
    async fn registration_boundary(
        &self,
        role: Option<UserRole>,
    ) -> Result<BoundaryRange, AppError>;

    /// Users whose registration date falls in `[start, end)`.
    async fn users_registered_in(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<UserDetail>, AppError>;
}

/// HTTP implementation against the user-directory service.
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn upstream(e: reqwest::Error) -> AppError {
        AppError::Internal(format!("user directory request failed: {e}"))
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn registration_boundary(
        &self,
        role: Option<UserRole>,
    ) -> Result<BoundaryRange, AppError> {
        let mut request = self
            .client
            .get(format!("{}/api/v1/users/registration-boundary", self.base_url));
        if let Some(role) = role {
            request = request.query(&[("role", role.to_string())]);
        }
        let boundary = request
            .send()
            .await
            .map_err(Self::upstream)?
            .error_for_status()
            .map_err(Self::upstream)?
            .json()
            .await
            .map_err(Self::upstream)?;
        Ok(boundary)
    }

    async fn users_registered_in(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<UserDetail>, AppError> {
        let users = self
            .client
            .get(format!("{}/api/v1/users", self.base_url))
            .query(&[
                ("registered_from", start.to_string()),
                ("registered_before", end.to_string()),
            ])
            .send()
            .await
            .map_err(Self::upstream)?
            .error_for_status()
            .map_err(Self::upstream)?
            .json()
            .await
            .map_err(Self::upstream)?;
        Ok(users)
    }
}

/// Fixed-population directory for tests and local runs.
pub struct StubUserDirectory {
    pub users: Vec<UserDetail>,
}

impl StubUserDirectory {
    pub fn new(users: Vec<UserDetail>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl UserDirectory for StubUserDirectory {
    async fn registration_boundary(
        &self,
        role: Option<UserRole>,
    ) -> Result<BoundaryRange, AppError> {
        let role_name = role.map(|r| r.to_string());
        let mut dates: Vec<NaiveDate> = self
            .users
            .iter()
            .filter(|u| role_name.as_deref().is_none_or(|r| u.role == r))
            .map(|u| u.registration_date)
            .collect();
        dates.sort();
        match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => Ok(BoundaryRange {
                first_registration_date: *first,
                last_registration_date: *last,
            }),
            _ => Err(AppError::NotFound("no users registered".to_string())),
        }
    }

    async fn users_registered_in(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<UserDetail>, AppError> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.registration_date >= start && u.registration_date < end)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(email: &str, role: &str, date: NaiveDate) -> UserDetail {
        UserDetail {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role: role.to_string(),
            registration_date: date,
        }
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, n).unwrap()
    }

    #[tokio::test]
    async fn test_stub_boundary_spans_population() {
        let directory = StubUserDirectory::new(vec![
            user("a@x.com", "subscribers", day(5)),
            user("b@x.com", "viewers", day(1)),
            user("c@x.com", "subscribers", day(20)),
        ]);

        let all = directory.registration_boundary(None).await.unwrap();
        assert_eq!(all.first_registration_date, day(1));
        assert_eq!(all.last_registration_date, day(20));

        let subs = directory
            .registration_boundary(Some(UserRole::Subscribers))
            .await
            .unwrap();
        assert_eq!(subs.first_registration_date, day(5));
    }

    #[tokio::test]
    async fn test_stub_range_is_half_open() {
        let directory = StubUserDirectory::new(vec![
            user("a@x.com", "subscribers", day(1)),
            user("b@x.com", "subscribers", day(10)),
        ]);

        let users = directory.users_registered_in(day(1), day(10)).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "a@x.com");
    }
}
