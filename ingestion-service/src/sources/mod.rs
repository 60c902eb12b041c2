pub mod leneda_http;

pub use leneda_http::LenedaClient;
