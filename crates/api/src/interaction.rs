use crate::{ledger::Ledger, library::QuizSource, Bot, Followup};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Body, Bytes},
    HeaderMap, Response, StatusCode,
};

pub async fn try_respond<B, L, S, F>(
    body: B,
    headers: &HeaderMap,
    bot: &Bot<L, S, F>,
    public: &VerifyingKey,
) -> Result<Response<Full<Bytes>>, StatusCode>
where
    B: Body,
    L: Ledger,
    S: QuizSource,
    F: Followup,
{
    // Retrieve security headers
    let maybe_sig = headers.get("X-Signature-Ed25519");
    let maybe_time = headers.get("X-Signature-Timestamp");
    let (sig, timestamp) = maybe_sig.zip(maybe_time).ok_or(StatusCode::UNAUTHORIZED)?;
    let signature = hex::decode(sig).map_err(|_| StatusCode::BAD_REQUEST)?;
    let signature = Signature::from_slice(&signature).map_err(|_| StatusCode::BAD_REQUEST)?;

    // Append body after the timestamp
    let payload = body.collect().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?.to_bytes();
    let mut message = timestamp.as_bytes().to_vec();
    message.extend_from_slice(&payload);

    // Validate the challenge
    public.verify(&message, &signature).map_err(|_| StatusCode::UNAUTHORIZED)?;
    drop(message);

    // Parse incoming interaction
    let interaction = serde_json::from_slice(&payload).map_err(|_| StatusCode::BAD_REQUEST)?;
    drop(payload);

    // Construct new body
    let reply = bot.on_message(interaction).await;
    let bytes = serde_json::to_vec(&reply).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    use hyper::header::{HeaderValue, CONTENT_TYPE};
    let mut res = Response::new(Full::new(Bytes::from(bytes)));
    res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(res)
}
