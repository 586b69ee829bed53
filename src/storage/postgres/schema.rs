pub const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS transactions (
    transaction_hash VARCHAR(66) UNIQUE NOT NULL,
    status BIGINT NOT NULL,
    block_hash VARCHAR(66) NOT NULL,
    block_number BIGINT NOT NULL,
    from_address VARCHAR(42) NOT NULL,
    to_address VARCHAR(42),
    contract_address VARCHAR(42),
    logs_count INTEGER NOT NULL DEFAULT 0,
    input TEXT NOT NULL,
    value VARCHAR(100) NOT NULL
);

CREATE INDEX IF NOT EXISTS transactions_block_number_idx ON transactions (block_number);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username VARCHAR(255) UNIQUE NOT NULL,
    password_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_transactions (
    user_id TEXT NOT NULL,
    transaction_hash VARCHAR(66) NOT NULL,
    UNIQUE (user_id, transaction_hash)
);
";

pub const TRANSACTION_COLUMNS: &str = "transaction_hash, status, block_hash, block_number, \
    from_address, to_address, contract_address, logs_count, input, value";
