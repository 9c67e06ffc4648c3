use tokio::sync::OnceCell;

pub(crate) static SET_INDEXED_SCRIPT_HASH: OnceCell<String> = OnceCell::const_new();
pub(crate) static DEL_INDEXED_SCRIPT_HASH: OnceCell<String> = OnceCell::const_new();

pub(crate) static SET_INDEXED_SCRIPT: &str = r#"
    local key = KEYS[1]
    local index_key = KEYS[2]
    local value = ARGV[1]
    local seconds = tonumber(ARGV[2])
    local member = ARGV[3]

    if seconds > 0 then
        redis.call('SET', key, value, 'EX', seconds)
    elseif seconds == 0 then
        redis.call('SET', key, value, 'PX', 1)
    else
        redis.call('SET', key, value)
    end

    redis.call('LREM', index_key, 0, member)
    return redis.call('LPUSH', index_key, member)
"#;

pub(crate) static DEL_INDEXED_SCRIPT: &str = r#"
    local key = KEYS[1]
    local index_key = KEYS[2]
    local member = ARGV[1]

    redis.call('LREM', index_key, 0, member)

    return redis.call('DEL', key)
"#;
