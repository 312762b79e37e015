use std::sync::Arc;

use persona_embed::{EmbeddingService, HashingEmbedder};

fn main() -> anyhow::Result<()> {
    let service = EmbeddingService::new(Arc::new(HashingEmbedder::new(1536)));
    let a = service.embed_text("Your reaction makes sense.")?;
    let b = service.embed_text("That reaction makes a lot of sense.")?;
    let c = service.embed_text("Leverage synergy to optimize the workflow.")?;
    println!("dim={} model={}", a.len(), service.model_info().model);
    println!("similar={:.3} unrelated={:.3}", service.cosine_similarity(&a, &b)?, service.cosine_similarity(&a, &c)?);
    Ok(())
}
