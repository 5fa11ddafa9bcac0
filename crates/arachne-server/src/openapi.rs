use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Arachne API",
        version = "0.1.0",
        description = "Distributed web scraping and crawling service."
    ),
    paths(
        crate::routes::scrape,
        crate::routes::crawl,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::ScrapeApiRequest,
        crate::dto::ScrapeApiResponse,
        crate::dto::CrawlApiRequest,
        crate::dto::CrawlApiResponse,
        crate::dto::CrawlScrapeOptionsDto,
        crate::dto::WebhookDto,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "scrape", description = "Single-URL scraping (v0)"),
        (name = "crawl", description = "Multi-URL crawling (v1)"),
        (name = "system", description = "Service health"),
    )
)]
pub struct ApiDoc;
