//! Account operations: signup, signin and billing setup.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::apiclient::Access;
use crate::error::ToastateError;
use crate::models::User;
use crate::session::Session;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SignupInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupOutput {
    pub user: User,
}

#[derive(Deserialize)]
struct SignupResponse {
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Clone, Default)]
pub struct SigninInput {
    pub email: String,
    pub password: String,
    pub extended_session: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigninOutput {
    pub token: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Serialize)]
struct SigninRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "is_false")]
    extended_session: bool,
    #[serde(skip_serializing_if = "is_false")]
    set_cookie: bool,
    #[serde(skip_serializing_if = "is_false")]
    set_token: bool,
}

#[derive(Deserialize)]
struct SigninResponse {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupBillingOutput {
    /// Page where the user enters payment details.
    pub url: String,
}

#[derive(Deserialize)]
struct SetupBillingResponse {
    #[serde(default)]
    url: String,
}

impl Session {
    pub async fn signup(&self, input: &SignupInput) -> Result<SignupOutput, ToastateError> {
        info!(email = %input.email, "Signing up");
        let resp: SignupResponse = self.client.post(Access::Public, "/signup", input).await?;
        let user = resp.user.ok_or(ToastateError::EmptyResponse("user"))?;
        Ok(SignupOutput { user })
    }

    /// Exchange credentials for a session token. The token is returned, not
    /// stored; pass it to [`Session::set_auth`].
    pub async fn signin(&self, input: &SigninInput) -> Result<SigninOutput, ToastateError> {
        info!(email = %input.email, extended = input.extended_session, "Signing in");
        let request = SigninRequest {
            email: &input.email,
            password: &input.password,
            extended_session: input.extended_session,
            set_cookie: false,
            set_token: true,
        };
        let resp: SigninResponse = self.client.post(Access::Public, "/signin", &request).await?;
        if resp.token.is_empty() {
            return Err(ToastateError::EmptyResponse("authentication token"));
        }
        Ok(SigninOutput { token: resp.token })
    }

    pub async fn setup_billing(&self) -> Result<SetupBillingOutput, ToastateError> {
        let resp: SetupBillingResponse = self
            .client
            .post_empty(Access::Authenticated, "/user/setupbilling")
            .await?;
        if resp.url.is_empty() {
            return Err(ToastateError::EmptyResponse("billing URL"));
        }
        Ok(SetupBillingOutput { url: resp.url })
    }
}
