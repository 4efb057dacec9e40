//! Topic commands: join, find, leave, publish.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, delete_json, get_json_opt, post_bytes, post_json_body};

#[derive(Deserialize)]
pub struct TopicResponse {
    pub topic: u32,
    pub name: String,
}

#[derive(Deserialize)]
struct TopicsResponse {
    topics: Vec<TopicView>,
}

#[derive(Deserialize)]
struct TopicView {
    topic: u32,
}

fn topics_url(port: u16, session: &str) -> String {
    format!("{}/sessions/{}/topics", base_url(port), session)
}

pub async fn join(port: u16, session: &str, name: &str) -> Result<TopicResponse> {
    #[derive(Serialize)]
    struct JoinRequest<'a> {
        name: &'a str,
    }

    post_json_body(&topics_url(port, session), &JoinRequest { name }).await
}

/// Handle of the joined topic named `name`, if any.
pub async fn find(port: u16, session: &str, name: &str) -> Result<Option<u32>> {
    let mut url = reqwest::Url::parse(&topics_url(port, session))?;
    url.query_pairs_mut().append_pair("name", name);
    let resp: Option<TopicsResponse> = get_json_opt(url.as_str()).await?;
    Ok(resp.and_then(|r| r.topics.first().map(|t| t.topic)))
}

pub async fn publish(port: u16, session: &str, topic: u32, data: Vec<u8>) -> Result<bool> {
    #[derive(Deserialize)]
    struct PublishResponse {
        published: bool,
    }

    let url = format!("{}/{}/publish", topics_url(port, session), topic);
    let resp: PublishResponse = post_bytes(&url, data).await?;
    Ok(resp.published)
}

pub async fn cmd_join(port: u16, session: &str, name: &str) -> Result<()> {
    let resp = join(port, session, name).await?;
    println!("✓ Joined {} as topic #{}", resp.name, resp.topic);
    Ok(())
}

pub async fn cmd_find(port: u16, session: &str, name: &str) -> Result<()> {
    match find(port, session, name).await? {
        Some(topic) => println!("{}", topic),
        None => println!("Topic not joined: {}", name),
    }
    Ok(())
}

pub async fn cmd_leave(port: u16, session: &str, topic: u32) -> Result<()> {
    #[derive(Deserialize)]
    struct LeaveResponse {
        left: bool,
    }

    let url = format!("{}/{}", topics_url(port, session), topic);
    let resp: LeaveResponse = delete_json(&url).await?;
    if resp.left {
        println!("✓ Left topic #{}", topic);
    } else {
        println!("Topic #{} is not joined", topic);
    }
    Ok(())
}

pub async fn cmd_publish(port: u16, session: &str, topic: u32, text: &str) -> Result<()> {
    if publish(port, session, topic, text.as_bytes().to_vec()).await? {
        println!("✓ Published {} bytes to topic #{}", text.len(), topic);
    } else {
        println!("✗ Publish to topic #{} failed", topic);
    }
    Ok(())
}
