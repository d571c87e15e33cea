//! # Blog Service
//!
//! CRUD over blog posts persisted in an injected [`DocumentStore`].
//!
//! Identifiers are validated before the store is touched: a malformed identifier is always
//! `INVALID_ARGUMENT`, a well-formed one that matches nothing is `NOT_FOUND`. Store failures
//! never leak as such and are reported as `INTERNAL`.
use crate::context::CallContext;
use crate::grpc::sink::{ResponseSink, ResponseStream};
use crate::proto::BlogService;
use crate::proto::blog::v1::{
    Blog, CreateBlogRequest, CreateBlogResponse, DeleteBlogRequest, DeleteBlogResponse,
    ListBlogRequest, ListBlogResponse, ReadBlogRequest, ReadBlogResponse, UpdateBlogRequest,
    UpdateBlogResponse,
};
use crate::status::ServiceError;
use crate::store::{Document, DocumentStore, ObjectId, StoreError};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument};

const RESPONSE_BUFFER: usize = 16;

pub mod methods {
    use crate::grpc::method::{Method, ServerStreaming, Unary};
    use crate::proto::blog::v1::*;

    pub const SERVICE: &str = "blog.v1.BlogService";

    pub const CREATE_BLOG: Method<CreateBlogRequest, CreateBlogResponse, Unary> =
        Method::new(SERVICE, "CreateBlog");
    pub const READ_BLOG: Method<ReadBlogRequest, ReadBlogResponse, Unary> =
        Method::new(SERVICE, "ReadBlog");
    pub const UPDATE_BLOG: Method<UpdateBlogRequest, UpdateBlogResponse, Unary> =
        Method::new(SERVICE, "UpdateBlog");
    pub const DELETE_BLOG: Method<DeleteBlogRequest, DeleteBlogResponse, Unary> =
        Method::new(SERVICE, "DeleteBlog");
    pub const LIST_BLOG: Method<ListBlogRequest, ListBlogResponse, ServerStreaming> =
        Method::new(SERVICE, "ListBlog");
}

/// Stored shape of a blog post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BlogItem {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    author_id: String,
    title: String,
    content: String,
}

impl BlogItem {
    fn from_blog(blog: Blog) -> Self {
        Self {
            id: None,
            author_id: blog.author_id,
            title: blog.title,
            content: blog.content,
        }
    }

    fn into_document(self) -> Result<Document, StoreError> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(document) => Ok(document),
            other => Err(StoreError::Unavailable(format!(
                "blog serialized into a non-object value: {other}"
            ))),
        }
    }

    fn from_document(document: Document) -> Result<Self, StoreError> {
        Ok(serde_json::from_value(serde_json::Value::Object(document))?)
    }

    fn into_blog(self) -> Result<Blog, StoreError> {
        let id = self.id.ok_or_else(|| {
            StoreError::Unavailable("stored blog has no identifier".to_string())
        })?;
        Ok(Blog {
            id: id.to_string(),
            author_id: self.author_id,
            title: self.title,
            content: self.content,
        })
    }
}

fn parse_id(raw: &str) -> Result<ObjectId, ServiceError> {
    raw.parse()
        .map_err(|err| ServiceError::InvalidArgument(format!("cannot parse blog id: {err}")))
}

fn required(blog: Option<Blog>) -> Result<Blog, ServiceError> {
    blog.ok_or_else(|| ServiceError::InvalidArgument("missing blog".to_string()))
}

fn not_found(id: &ObjectId) -> ServiceError {
    ServiceError::NotFound(format!("cannot find blog with id {id}"))
}

pub struct BlogServiceImpl<S> {
    store: Arc<S>,
    list_pacing: Duration,
}

impl<S> BlogServiceImpl<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            list_pacing: Duration::ZERO,
        }
    }

    /// Delay between two `ListBlog` responses. Zero disables pacing.
    pub fn with_list_pacing(mut self, pacing: Duration) -> Self {
        self.list_pacing = pacing;
        self
    }
}

#[tonic::async_trait]
impl<S: DocumentStore> BlogService for BlogServiceImpl<S> {
    type ListBlogStream = ResponseStream<ListBlogResponse>;

    #[instrument(skip_all)]
    async fn create_blog(
        &self,
        request: Request<CreateBlogRequest>,
    ) -> Result<Response<CreateBlogResponse>, Status> {
        let blog = required(request.into_inner().blog)?;
        info!(author_id = %blog.author_id, "CreateBlog invoked");

        let mut item = BlogItem::from_blog(blog);
        let document = item.clone().into_document().map_err(ServiceError::from)?;
        let id = self.store.insert(document).await.map_err(ServiceError::from)?;
        item.id = Some(id);

        let blog = item.into_blog().map_err(ServiceError::from)?;
        Ok(Response::new(CreateBlogResponse { blog: Some(blog) }))
    }

    #[instrument(skip_all)]
    async fn read_blog(
        &self,
        request: Request<ReadBlogRequest>,
    ) -> Result<Response<ReadBlogResponse>, Status> {
        let id = parse_id(&request.into_inner().blog_id)?;
        info!(%id, "ReadBlog invoked");

        let document = self
            .store
            .find_one(&id)
            .await
            .map_err(ServiceError::from)?
            .ok_or_else(|| not_found(&id))?;

        let blog = BlogItem::from_document(document)
            .and_then(BlogItem::into_blog)
            .map_err(ServiceError::from)?;
        Ok(Response::new(ReadBlogResponse { blog: Some(blog) }))
    }

    #[instrument(skip_all)]
    async fn update_blog(
        &self,
        request: Request<UpdateBlogRequest>,
    ) -> Result<Response<UpdateBlogResponse>, Status> {
        let blog = required(request.into_inner().blog)?;
        let id = parse_id(&blog.id)?;
        info!(%id, "UpdateBlog invoked");

        // Existence is checked first so an absent blog reports NOT_FOUND before any write.
        self.store
            .find_one(&id)
            .await
            .map_err(ServiceError::from)?
            .ok_or_else(|| not_found(&id))?;

        let mut item = BlogItem::from_blog(blog);
        item.id = Some(id);
        let document = item.clone().into_document().map_err(ServiceError::from)?;

        // A concurrent delete may win the race between the lookup and the write.
        if !self.store.replace(&id, document).await.map_err(ServiceError::from)? {
            return Err(not_found(&id).into());
        }

        let blog = item.into_blog().map_err(ServiceError::from)?;
        Ok(Response::new(UpdateBlogResponse { blog: Some(blog) }))
    }

    #[instrument(skip_all)]
    async fn delete_blog(
        &self,
        request: Request<DeleteBlogRequest>,
    ) -> Result<Response<DeleteBlogResponse>, Status> {
        let id = parse_id(&request.into_inner().blog_id)?;
        info!(%id, "DeleteBlog invoked");

        let deleted = self.store.delete(&id).await.map_err(ServiceError::from)?;
        if deleted == 0 {
            return Err(ServiceError::Internal(format!("cannot delete blog with id {id}")).into());
        }

        Ok(Response::new(DeleteBlogResponse {
            blog_id: id.to_string(),
        }))
    }

    #[instrument(skip_all)]
    async fn list_blog(
        &self,
        request: Request<ListBlogRequest>,
    ) -> Result<Response<Self::ListBlogStream>, Status> {
        let context = CallContext::from_request(&request);
        info!("ListBlog invoked");

        let mut documents = self.store.iterate().await.map_err(ServiceError::from)?;
        let pacing = self.list_pacing;

        let (sink, stream) = ResponseSink::channel(context, RESPONSE_BUFFER);
        tokio::spawn(async move {
            let mut first = true;
            while let Some(document) = documents.next().await {
                let blog = match document.and_then(BlogItem::from_document).and_then(BlogItem::into_blog) {
                    Ok(blog) => blog,
                    Err(err) => return sink.fail(ServiceError::from(err)).await,
                };

                if !first && let Err(err) = sink.pace(pacing).await {
                    debug!(%err, "listing stopped");
                    return sink.fail(err).await;
                }
                first = false;

                if let Err(err) = sink.send(ListBlogResponse { blog: Some(blog) }).await {
                    debug!(%err, "listing stopped");
                    return sink.fail(err).await;
                }
            }
        });

        Ok(Response::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blog_item_document_layout() {
        let item = BlogItem {
            id: Some("5f1d7c3e9a1b2c3d4e5f6a7b".parse().unwrap()),
            author_id: "ada".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
        };

        let document = item.clone().into_document().unwrap();

        assert_eq!(document["_id"], json!("5f1d7c3e9a1b2c3d4e5f6a7b"));
        assert_eq!(document["author_id"], json!("ada"));
        assert_eq!(BlogItem::from_document(document).unwrap(), item);
    }

    #[test]
    fn test_new_blog_item_has_no_id_field() {
        let item = BlogItem::from_blog(Blog {
            id: "ignored".to_string(),
            author_id: "ada".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
        });

        let document = item.into_document().unwrap();
        assert!(!document.contains_key("_id"));
    }

    #[test]
    fn test_undecodable_document_is_an_error() {
        let mut document = Document::new();
        document.insert("_id".to_string(), json!(42));

        assert!(matches!(
            BlogItem::from_document(document),
            Err(StoreError::Decode(_))
        ));
    }
}
