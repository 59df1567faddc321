mod embeds;
mod helpers;
