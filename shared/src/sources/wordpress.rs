//! WordPress site adapter (REST API).

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::info;

use super::{settle, upstream_error, DataSource, SourceError, SOURCE_TIMEOUT, TOP_N};
use crate::models::{CommentRow, DateRange, PostRow, ProviderResult, SiteReport, SiteSummary};
use crate::settings::{non_empty, SiteCredentials};

const PROVIDER: &str = "wordpress";
const TOTAL_HEADER: &str = "x-wp-total";

/// Words kept from each comment body.
const EXCERPT_WORDS: usize = 20;

#[derive(Debug, Clone)]
struct BasicAuth {
    username: String,
    password: String,
}

#[derive(Debug, Clone)]
enum SiteMode {
    Mock,
    Live { site_url: String, auth: Option<BasicAuth> },
}

/// Post, page and comment counts from the marketing site.
pub struct WordPressSource {
    http: reqwest::Client,
    mode: SiteMode,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    id: u64,
    #[serde(default)]
    date: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: WpRendered,
}

#[derive(Debug, Deserialize)]
struct WpComment {
    id: u64,
    #[serde(default)]
    post: u64,
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    content: WpRendered,
}

#[derive(Debug, Default, Deserialize)]
struct WpRendered {
    #[serde(default)]
    rendered: String,
}

impl WordPressSource {
    pub fn new(http: reqwest::Client, credentials: &SiteCredentials) -> Self {
        let mode = match non_empty(&credentials.url) {
            None => SiteMode::Mock,
            Some(url) => {
                let auth = match (
                    non_empty(&credentials.username),
                    non_empty(&credentials.application_password),
                ) {
                    (Some(username), Some(password)) => Some(BasicAuth {
                        username: username.to_string(),
                        // Application passwords are displayed with spaces; both forms are accepted.
                        password: password.replace(' ', ""),
                    }),
                    _ => None,
                };
                SiteMode::Live {
                    site_url: url.trim_end_matches('/').to_string(),
                    auth,
                }
            }
        };

        Self { http, mode }
    }

    fn get(&self, site_url: &str, auth: &Option<BasicAuth>, resource: &str) -> RequestBuilder {
        let request = self
            .http
            .get(format!("{}/wp-json/wp/v2/{}", site_url, resource))
            .timeout(SOURCE_TIMEOUT);
        match auth {
            Some(auth) => request.basic_auth(&auth.username, Some(&auth.password)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, SourceError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(upstream_error("WordPress", response).await);
        }
        Ok(response)
    }

    async fn count(&self, request: RequestBuilder) -> Result<u64, SourceError> {
        let response = self.send(request).await?;
        total_from_headers(&response)
    }

    async fn recent_posts(&self, request: RequestBuilder) -> Result<(u64, Vec<PostRow>), SourceError> {
        let response = self.send(request).await?;
        let total = total_from_headers(&response)?;
        let posts: Vec<WpPost> = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("WordPress posts: {}", e)))?;

        let rows = posts
            .into_iter()
            .take(TOP_N)
            .map(|p| PostRow {
                id: p.id,
                title: p.title.rendered,
                date: p.date,
                link: p.link,
                comment_count: None,
            })
            .collect();
        Ok((total, rows))
    }

    async fn recent_comments(&self, request: RequestBuilder) -> Result<(u64, Vec<CommentRow>), SourceError> {
        let response = self.send(request).await?;
        let total = total_from_headers(&response)?;
        let comments: Vec<WpComment> = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("WordPress comments: {}", e)))?;

        let rows = comments
            .into_iter()
            .take(TOP_N)
            .map(|c| CommentRow {
                id: c.id,
                post: c.post,
                post_title: None,
                author: c.author_name,
                date: c.date,
                content: excerpt(&c.content.rendered, EXCERPT_WORDS),
            })
            .collect();
        Ok((total, rows))
    }

    /// Fill in each post's approved-comment count. A count that cannot be read stays `None`.
    async fn attach_comment_counts(&self, site_url: &str, auth: &Option<BasicAuth>, posts: &mut [PostRow]) {
        let mut counts = tokio::task::JoinSet::new();
        for (index, post) in posts.iter().enumerate() {
            let post_id = post.id.to_string();
            let request = self.get(site_url, auth, "comments").query(&[
                ("post", post_id.as_str()),
                ("status", "approve"),
                ("per_page", "1"),
                ("_fields", "id"),
            ]);
            counts.spawn(async move {
                let count = match request.send().await {
                    Ok(response) if response.status().is_success() => total_from_headers(&response).ok(),
                    _ => None,
                };
                (index, count)
            });
        }

        while let Some(joined) = counts.join_next().await {
            if let Ok((index, count)) = joined {
                posts[index].comment_count = count;
            }
        }
    }

    async fn fetch_site(
        &self,
        site_url: &str,
        auth: &Option<BasicAuth>,
        range: &DateRange,
    ) -> Result<SiteReport, SourceError> {
        let after = format!("{}T00:00:00", range.start);
        let before = format!("{}T23:59:59", range.end);
        let per_page = TOP_N.to_string();

        let posts = self.get(site_url, auth, "posts").query(&[
            ("after", after.as_str()),
            ("before", before.as_str()),
            ("per_page", per_page.as_str()),
            ("orderby", "date"),
            ("order", "desc"),
            ("_fields", "id,date,link,title"),
        ]);
        let pages = self
            .get(site_url, auth, "pages")
            .query(&[("status", "publish"), ("per_page", "1"), ("_fields", "id")]);
        let comments = self.get(site_url, auth, "comments").query(&[
            ("after", after.as_str()),
            ("before", before.as_str()),
            ("status", "approve"),
            ("per_page", per_page.as_str()),
            ("orderby", "date"),
            ("order", "desc"),
            ("_fields", "id,post,author_name,date,content"),
        ]);

        let ((total_posts, mut recent_posts), total_pages, (total_comments, mut recent_comments)) = tokio::try_join!(
            self.recent_posts(posts),
            self.count(pages),
            self.recent_comments(comments)
        )?;

        self.attach_comment_counts(site_url, auth, &mut recent_posts).await;
        for comment in &mut recent_comments {
            comment.post_title = recent_posts
                .iter()
                .find(|p| p.id == comment.post)
                .map(|p| p.title.clone());
        }

        info!(total_posts, total_pages, total_comments, "Fetched WordPress site data");
        Ok(SiteReport {
            summary: SiteSummary {
                site_url: site_url.to_string(),
                total_posts,
                total_pages,
                total_comments,
            },
            recent_posts,
            recent_comments,
            note: None,
        })
    }
}

#[async_trait]
impl DataSource for WordPressSource {
    type Report = SiteReport;

    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch(&self, range: &DateRange) -> ProviderResult<SiteReport> {
        let result = match &self.mode {
            SiteMode::Mock => Ok(mock_report()),
            SiteMode::Live { site_url, auth } => self.fetch_site(site_url, auth, range).await,
        };
        settle(PROVIDER, result)
    }
}

fn total_from_headers(response: &reqwest::Response) -> Result<u64, SourceError> {
    response
        .headers()
        .get(TOTAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| SourceError::Malformed(format!("missing {} header", TOTAL_HEADER)))
}

/// First `max_words` words of a rendered HTML fragment, tags removed.
fn excerpt(html: &str, max_words: usize) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > max_words {
        format!("{}...", words[..max_words].join(" "))
    } else {
        words.join(" ")
    }
}

fn mock_report() -> SiteReport {
    let post = |id, title: &str, date: &str, comments| PostRow {
        id,
        title: title.to_string(),
        date: date.to_string(),
        link: format!("https://example.com/?p={}", id),
        comment_count: Some(comments),
    };

    SiteReport {
        summary: SiteSummary {
            site_url: "https://example.com".to_string(),
            total_posts: 12,
            total_pages: 8,
            total_comments: 47,
        },
        recent_posts: vec![
            post(128, "Spring Campaign Launch", "2024-03-06T09:30:00", 5),
            post(127, "Five Ways to Improve Landing Page Conversions", "2024-03-02T14:00:00", 9),
        ],
        recent_comments: vec![CommentRow {
            id: 3051,
            post: 127,
            post_title: Some("Five Ways to Improve Landing Page Conversions".to_string()),
            author: "Dana".to_string(),
            date: "2024-03-03T11:12:00".to_string(),
            content: "The headline test in tip three doubled our sign-ups.".to_string(),
        }],
        note: Some("mock data - configure the site URL for real data".to_string()),
    }
}
