pub mod auth;
pub mod http;
pub mod mail;

pub use auth::{Authenticator, HttpAuthenticator};
pub use http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient, TransportError,
};
pub use mail::{LogMailer, Mailer};
