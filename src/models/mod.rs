mod article;
mod domain;

pub use article::{Article, ArticleQuery, NewArticle};
pub use domain::{Domain, NamedRow};
