mod export;
mod run;
mod scrape;
mod support;
