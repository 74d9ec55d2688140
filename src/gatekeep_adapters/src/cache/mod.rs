pub mod redis_cache_hooks;
