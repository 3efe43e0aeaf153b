use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("invalid argument: {_0}")]
    Argument(#[error(not(source))] String),
    #[display("could not open storage")]
    Storage,
    #[display("chapter cache error")]
    Cache,
    #[display("could not list chapters")]
    Source,
    #[display("chapter processing failed")]
    Pipeline,
    #[display("interrupted")]
    Interrupted,
}
